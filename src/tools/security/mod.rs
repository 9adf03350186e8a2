//! Security controls for generated code.
//!
//! This module decides whether a piece of generated code may run at all:
//!
//! - **Validation**: [`CodeValidator`] lexes the code, rejects syntax errors,
//!   and matches every call and import against glob pattern sets
//! - **Call extraction**: [`CallExpression`] turns validated code into a
//!   structured call against a catalogued tool
//!
//! ## Validation
//!
//! ```rust
//! use toolhost::tools::security::CodeValidator;
//!
//! let validator = CodeValidator::new().with_blocked("requests.*");
//!
//! let result = validator.validate("requests.get('https://example.com')");
//! assert!(!result.valid);
//!
//! let result = validator.validate("weather.forecast(city='Oslo')");
//! assert!(result.valid);
//! ```
//!
//! ## Default Security Settings
//!
//! By default, `CodeValidator` blocks:
//! - Dynamic evaluation (`exec`, `eval`, `compile`, `__import__`)
//! - Process creation (`os.system`, `os.popen`, `os.exec*`, `os.spawn*`,
//!   `os.fork`, `subprocess.*`, `pty.spawn`)
//!
//! And warns on file and deserialization helpers (`open`, `pickle.load`,
//! `yaml.load`, `shutil.rmtree`, ...) and on imports of `os`, `subprocess`,
//! `sys`, `shutil`, `ctypes`, `pickle` and `socket`.

mod call;
pub mod lexer;
mod patterns;
mod validator;

pub use call::CallExpression;
pub use lexer::{SyntaxError, Token, TokenKind};
pub use patterns::{AllowList, PatternSet};
pub use validator::{
    CodeValidator, SecurityConfig, ValidationResult, DEFAULT_BLOCKED, DEFAULT_MAX_LINE_LENGTH,
    DEFAULT_WARNED, DEFAULT_WARNED_IMPORTS,
};
