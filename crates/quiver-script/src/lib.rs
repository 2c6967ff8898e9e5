//! # quiver-script
//!
//! The plugin script language for `script`-kind artifacts.
//!
//! Stored scripts follow a rigid shape: top-level `import` statements and
//! class definitions only, with exactly one class extending the `Tool`
//! base. The executor evaluates the top level (which can bind nothing but
//! imports and classes), locates that class, instantiates it with the
//! capability context, and invokes its `run(arguments)` method.
//!
//! ```text
//! import util
//!
//! class Greeter(Tool) {
//!     fn run(self, arguments) {
//!         let name = arguments["name"];
//!         if name == null { return "Hello, stranger!"; }
//!         return "Hello, " + str(name) + "!";
//!     }
//! }
//! ```
//!
//! The language is deliberately small: no top-level effects, no file or
//! process access, no dynamic evaluation. Everything a script can do to the
//! outside world goes through the capabilities on `self` (`log`,
//! `call_tool`, `query`, `meta_query`, `context`), which the host injects
//! per dispatch. Structural policy (denied modules, functions, attributes)
//! is enforced separately by the validator walking the parsed tree.

pub mod ast;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod value;

pub use ast::{ClassDef, Expr, FnDef, Import, Item, Script, Stmt};
pub use error::ScriptError;
pub use interp::{find_tool_class, HostEnv, Interpreter, NullHost};
pub use parser::parse;
pub use value::Value;
