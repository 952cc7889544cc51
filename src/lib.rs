//! Parser, diagnostics and canonical generator for SIEVE mail filtering
//! scripts (RFC 5228 and common extensions).
//!
//! ```
//! let script = sieveform::parse("if size :over 1M { discard; }").unwrap();
//! let text = sieveform::generate(&script, &sieveform::GeneratorOptions::default());
//! assert_eq!(text, "if size :over 1M {\n    discard;\n}");
//! ```

pub mod config;
pub mod logging;
pub mod sieve;
pub mod store;

pub use sieve::ast;
pub use sieve::capabilities::{declared_capabilities, missing_capabilities, required_capabilities};
pub use sieve::diagnostic::{Diagnostic, DiagnosticKind, Expected, ExpectedKind};
pub use sieve::{generate, get_error, parse, parse_with, validate, GeneratorOptions, ParseOptions};
