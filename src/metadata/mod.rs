//! Method-level metadata consumed and produced by the engine.
//!
//! Only the parts of ECMA-335 metadata that a method body needs are modelled here: the
//! [`token::Token`] type used by operands and catch clauses, and the [`method::MethodBody`]
//! with its [`method::ExceptionHandler`] table. Reading and writing PE files is left to the
//! surrounding tool.

pub mod method;
/// Metadata tokens identifying rows in the metadata tables
pub mod token;
