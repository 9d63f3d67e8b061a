//! Exception handler representation for CIL method bodies.
//!
//! Boundaries are expressed as indices into the method's instruction list rather than byte
//! offsets: `try_start..try_end` and `handler_start..handler_end` are half-open ranges, and an
//! end equal to the instruction count means "up to the end of the method". The same type is
//! consumed by [`crate::blocks::GraphBuilder`] and produced by
//! [`crate::blocks::CodeGenerator`].

use std::ops::Range;

use bitflags::bitflags;

use crate::{metadata::token::Token, Result};

bitflags! {
    /// Exception handler flags defining the type of exception handling clause.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause; `catch_type` names the caught class.
        const EXCEPTION = 0x0000;

        /// An exception filter and handler clause.
        ///
        /// The filter block starting at `filter_start` decides whether the handler runs.
        const FILTER = 0x0001;

        /// A finally clause, executed on every exit from the protected region.
        const FINALLY = 0x0002;

        /// A fault clause (finally that executes only on exception).
        const FAULT = 0x0004;
    }
}

/// One row of a method's exception handler table.
///
/// # Layout in IL
///
/// ```text
/// try {            // try_start..try_end
/// }
/// filter {         // filter_start..handler_start (FILTER only)
/// }
/// catch / finally  // handler_start..handler_end
/// ```
///
/// # Examples
///
/// ```rust
/// use cilflow::metadata::{method::ExceptionHandler, token::Token};
///
/// let handler = ExceptionHandler::catch(0..4, 4..6, Token::new(0x0100_0001));
/// assert!(handler.is_catch());
/// assert!(handler.pushes_exception());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Flags describing the type of exception handler (catch, filter, finally, fault).
    pub flags: ExceptionHandlerFlags,
    /// Index of the first instruction of the protected region
    pub try_start: usize,
    /// Index one past the last instruction of the protected region
    pub try_end: usize,
    /// Index of the first filter instruction, for filter clauses
    pub filter_start: Option<usize>,
    /// Index of the first handler instruction
    pub handler_start: usize,
    /// Index one past the last handler instruction
    pub handler_end: usize,
    /// Class caught by a typed clause
    pub catch_type: Option<Token>,
}

impl ExceptionHandler {
    /// Creates a typed catch clause.
    #[must_use]
    pub fn catch(try_range: Range<usize>, handler_range: Range<usize>, catch_type: Token) -> Self {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::EXCEPTION,
            try_start: try_range.start,
            try_end: try_range.end,
            filter_start: None,
            handler_start: handler_range.start,
            handler_end: handler_range.end,
            catch_type: Some(catch_type),
        }
    }

    /// Creates a filter clause; the filter runs from `filter_start` up to the handler.
    #[must_use]
    pub fn filter(
        try_range: Range<usize>,
        filter_start: usize,
        handler_range: Range<usize>,
    ) -> Self {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::FILTER,
            try_start: try_range.start,
            try_end: try_range.end,
            filter_start: Some(filter_start),
            handler_start: handler_range.start,
            handler_end: handler_range.end,
            catch_type: None,
        }
    }

    /// Creates a finally clause.
    #[must_use]
    pub fn finally(try_range: Range<usize>, handler_range: Range<usize>) -> Self {
        Self::untyped(ExceptionHandlerFlags::FINALLY, try_range, handler_range)
    }

    /// Creates a fault clause.
    #[must_use]
    pub fn fault(try_range: Range<usize>, handler_range: Range<usize>) -> Self {
        Self::untyped(ExceptionHandlerFlags::FAULT, try_range, handler_range)
    }

    fn untyped(
        flags: ExceptionHandlerFlags,
        try_range: Range<usize>,
        handler_range: Range<usize>,
    ) -> Self {
        ExceptionHandler {
            flags,
            try_start: try_range.start,
            try_end: try_range.end,
            filter_start: None,
            handler_start: handler_range.start,
            handler_end: handler_range.end,
            catch_type: None,
        }
    }

    /// Returns `true` for filter clauses.
    #[must_use]
    pub fn is_filter(&self) -> bool {
        self.flags.contains(ExceptionHandlerFlags::FILTER)
    }

    /// Returns `true` for finally clauses.
    #[must_use]
    pub fn is_finally(&self) -> bool {
        self.flags.contains(ExceptionHandlerFlags::FINALLY)
    }

    /// Returns `true` for fault clauses.
    #[must_use]
    pub fn is_fault(&self) -> bool {
        self.flags.contains(ExceptionHandlerFlags::FAULT)
    }

    /// Returns `true` for typed catch clauses.
    #[must_use]
    pub fn is_catch(&self) -> bool {
        self.flags.is_empty()
    }

    /// Returns `true` if the runtime pushes the exception object when entering the handler
    /// (catch and filter clauses).
    #[must_use]
    pub fn pushes_exception(&self) -> bool {
        self.is_catch() || self.is_filter()
    }

    /// Returns the start of the filter, or of the handler for clauses without one.
    #[must_use]
    pub fn filter_or_handler_start(&self) -> usize {
        self.filter_start.unwrap_or(self.handler_start)
    }

    /// Checks that all ranges are non-empty, lie within `instruction_count` and that the
    /// clause kind is consistent.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MalformedExceptionTable`] describing the first problem found.
    pub fn validate(&self, instruction_count: usize) -> Result<()> {
        let kinds = [self.is_filter(), self.is_finally(), self.is_fault()]
            .iter()
            .filter(|&&kind| kind)
            .count();
        if kinds > 1 {
            return Err(malformed_eh_error!(
                "Conflicting handler flags {:?}",
                self.flags
            ));
        }

        if self.try_start >= self.try_end || self.try_end > instruction_count {
            return Err(malformed_eh_error!(
                "Invalid try range {}..{} (method has {} instructions)",
                self.try_start,
                self.try_end,
                instruction_count
            ));
        }

        if self.handler_start >= self.handler_end || self.handler_end > instruction_count {
            return Err(malformed_eh_error!(
                "Invalid handler range {}..{} (method has {} instructions)",
                self.handler_start,
                self.handler_end,
                instruction_count
            ));
        }

        match (self.is_filter(), self.filter_start) {
            (true, Some(filter_start)) if filter_start < self.handler_start => {}
            (true, _) => {
                return Err(malformed_eh_error!(
                    "Filter clause needs a filter start before handler {}",
                    self.handler_start
                ))
            }
            (false, Some(_)) => {
                return Err(malformed_eh_error!(
                    "Filter start on a non-filter clause {:?}",
                    self.flags
                ))
            }
            (false, None) => {}
        }

        if let Some(catch_type) = self.catch_type {
            if !catch_type.is_type() {
                return Err(malformed_eh_error!(
                    "Catch type {} is not a type token",
                    catch_type
                ));
            }
        }

        Ok(())
    }
}
