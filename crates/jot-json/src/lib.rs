//! Streaming JSON tokenizer that reports document structure to a
//! [`Listener`] instead of building a tree.
//!
//! Beyond strict JSON, bare identifiers are accepted as object keys.
//!
//! ```
//! use jot_json::{Listener, ListenerError, parse_str};
//!
//! #[derive(Default)]
//! struct Keys(Vec<String>);
//!
//! impl Listener for Keys {
//!     fn property(&mut self, name: &str) -> Result<(), ListenerError> {
//!         self.0.push(name.to_string());
//!         Ok(())
//!     }
//! }
//!
//! let mut keys = Keys::default();
//! parse_str(r#"{"a":1,b:{"c":[true]}}"#, &mut keys).unwrap();
//! assert_eq!(keys.0, ["a", "b", "c"]);
//! ```

mod error;
mod input;
mod lexer;
mod parser;

pub use error::ParseError;
pub use input::{DEFAULT_NAME, ParserInput};
pub use lexer::{Lexer, Number, Token};
pub use parser::{JsonParser, Listener, ListenerError, parse_file, parse_str};
