//! Error codes for the corgi diagnostic system.
//!
//! Error codes are organized by phase:
//! - `E0xx` - Lexer errors
//! - `E1xx` - Parser errors
//! - `E2xx` - Resolution errors (loading, linking)
//! - `E3xx` - Composition errors (call contracts, collisions, validation)
//! - `E4xx` - Analysis errors

use std::fmt;

/// Error codes for categorizing diagnostic errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorCode {
    // =========================================================================
    // Lexer Errors (E0xx)
    // =========================================================================
    /// Unterminated string literal.
    ///
    /// A string, rune or raw string was opened but not closed on the same line.
    E001,

    /// Unexpected character.
    ///
    /// A character was encountered that is not valid at this point of the line.
    E002,

    /// Mixed indentation.
    ///
    /// A line is indented with both tabs and spaces.
    E003,

    /// Inconsistent indentation.
    ///
    /// A line does not use the indentation character, or a multiple of the
    /// indentation width, established by the first indented line.
    E004,

    /// Indentation increase.
    ///
    /// A line is indented by more than one level relative to the previous line.
    E005,

    /// Unexpected end of line.
    ///
    /// The line ended inside an expression, attribute list or argument list.
    E006,

    // =========================================================================
    // Parser Errors (E1xx)
    // =========================================================================
    /// Unexpected token.
    ///
    /// The parser encountered a token it did not expect at this position.
    E100,

    /// Unexpected end of input.
    ///
    /// The file ended before a complete construct was parsed.
    E101,

    /// Extend placement.
    ///
    /// `extend` must be the first directive of a file.
    E102,

    /// Import placement.
    ///
    /// `import` directives must directly follow `extend` or start the file.
    E103,

    /// Use placement.
    ///
    /// `use` directives must directly follow the imports.
    E104,

    /// Missing func.
    ///
    /// A main file must declare its `func` before any output.
    E105,

    /// Include extends.
    ///
    /// A file used through `include` must not extend another file.
    E106,

    /// Not allowed in this file.
    ///
    /// The item is not allowed in this kind of file, for example a `func`
    /// in a library file or a `doctype` in a template.
    E107,

    /// Not allowed here.
    ///
    /// The item is not allowed at this place, for example markup directly
    /// inside a mixin call or a `block` outside of a template.
    E108,

    /// Block fill in conditional.
    ///
    /// A block fill appears inside a conditional of a mixin call body, where
    /// the filled block cannot be determined statically.
    E109,

    /// Ternary condition.
    ///
    /// The condition of a ternary expression is itself a nil-check chain or
    /// a ternary.
    E110,

    /// Nil-check default.
    ///
    /// The default of a nil-check chain is itself a nil-check chain or a
    /// ternary.
    E111,

    /// Invalid expression.
    ///
    /// An expression uses `?` outside of a chain or ternary.
    E112,

    /// Invalid interpolation.
    ///
    /// A `#{`, `#!{`, `#[` or `#+` interpolation is malformed or unclosed.
    E113,

    /// Invalid mixin parameter.
    ///
    /// A mixin parameter has neither a type nor a literal default to infer one
    /// from, or its name is used twice.
    E114,

    /// Duplicate func.
    ///
    /// A main file declares more than one `func`.
    E115,

    // =========================================================================
    // Resolution Errors (E2xx)
    // =========================================================================
    /// Template not found.
    ///
    /// The file named by `extend` does not exist.
    E200,

    /// Include not found.
    ///
    /// The file named by `include` does not exist.
    E201,

    /// Library not found.
    ///
    /// The library named by `use` does not exist or contains no library files.
    E202,

    /// Load failure.
    ///
    /// A file could not be read.
    E203,

    /// Circular dependency.
    ///
    /// Files extend, include or use each other in a cycle.
    E204,

    /// Unknown mixin.
    ///
    /// A mixin call does not resolve to any visible mixin.
    E205,

    /// Missing use for library.
    ///
    /// A namespace-qualified mixin call names a namespace no `use` declares.
    E206,

    // =========================================================================
    // Composition Errors (E3xx)
    // =========================================================================
    /// Namespace collision.
    ///
    /// Two `use` directives of one file claim the same namespace.
    E300,

    /// Mixin redeclared.
    ///
    /// Two mixins with the same name are visible in the same scope.
    E301,

    /// Unknown parameter.
    ///
    /// A mixin call passes an argument the mixin does not declare.
    E302,

    /// Duplicate parameter.
    ///
    /// A mixin call passes the same argument twice.
    E303,

    /// Missing parameter.
    ///
    /// A mixin call does not pass a parameter that has no default.
    E304,

    /// Duplicate block.
    ///
    /// A mixin call or extending file fills the same block twice.
    E305,

    /// Unknown block.
    ///
    /// A mixin call fills a block the mixin does not declare.
    E306,

    /// Illegal `&`.
    ///
    /// An `&` appears where no element can receive it, or after the element's
    /// body was started.
    E307,

    /// Mixin content.
    ///
    /// A block fill writes attributes the block cannot accept.
    E308,

    /// Void element with body.
    ///
    /// A void element has content.
    E309,

    /// Mixin takes no attributes.
    ///
    /// An `&` is passed to a mixin that has no `&&` placeholder.
    E310,

    /// Unknown template block.
    ///
    /// An extending file fills a block none of its templates declare.
    E311,

    // =========================================================================
    // Analysis Errors (E4xx)
    // =========================================================================
    /// Mixin recursion.
    ///
    /// Mixins call themselves, directly or through other mixins.
    E400,
}

impl ErrorCode {
    /// Returns the numeric code as a string (e.g., "E001").
    pub fn as_str(&self) -> &'static str {
        match self {
            // Lexer errors
            ErrorCode::E001 => "E001",
            ErrorCode::E002 => "E002",
            ErrorCode::E003 => "E003",
            ErrorCode::E004 => "E004",
            ErrorCode::E005 => "E005",
            ErrorCode::E006 => "E006",
            // Parser errors
            ErrorCode::E100 => "E100",
            ErrorCode::E101 => "E101",
            ErrorCode::E102 => "E102",
            ErrorCode::E103 => "E103",
            ErrorCode::E104 => "E104",
            ErrorCode::E105 => "E105",
            ErrorCode::E106 => "E106",
            ErrorCode::E107 => "E107",
            ErrorCode::E108 => "E108",
            ErrorCode::E109 => "E109",
            ErrorCode::E110 => "E110",
            ErrorCode::E111 => "E111",
            ErrorCode::E112 => "E112",
            ErrorCode::E113 => "E113",
            ErrorCode::E114 => "E114",
            ErrorCode::E115 => "E115",
            // Resolution errors
            ErrorCode::E200 => "E200",
            ErrorCode::E201 => "E201",
            ErrorCode::E202 => "E202",
            ErrorCode::E203 => "E203",
            ErrorCode::E204 => "E204",
            ErrorCode::E205 => "E205",
            ErrorCode::E206 => "E206",
            // Composition errors
            ErrorCode::E300 => "E300",
            ErrorCode::E301 => "E301",
            ErrorCode::E302 => "E302",
            ErrorCode::E303 => "E303",
            ErrorCode::E304 => "E304",
            ErrorCode::E305 => "E305",
            ErrorCode::E306 => "E306",
            ErrorCode::E307 => "E307",
            ErrorCode::E308 => "E308",
            ErrorCode::E309 => "E309",
            ErrorCode::E310 => "E310",
            ErrorCode::E311 => "E311",
            // Analysis errors
            ErrorCode::E400 => "E400",
        }
    }

    /// Returns a short description of what this error code means.
    pub fn description(&self) -> &'static str {
        match self {
            // Lexer errors
            ErrorCode::E001 => "unterminated string literal",
            ErrorCode::E002 => "unexpected character",
            ErrorCode::E003 => "mixed indentation",
            ErrorCode::E004 => "inconsistent indentation",
            ErrorCode::E005 => "indentation increase",
            ErrorCode::E006 => "unexpected end of line",
            // Parser errors
            ErrorCode::E100 => "unexpected token",
            ErrorCode::E101 => "unexpected end of input",
            ErrorCode::E102 => "extend placement",
            ErrorCode::E103 => "import placement",
            ErrorCode::E104 => "use placement",
            ErrorCode::E105 => "missing func",
            ErrorCode::E106 => "include extends",
            ErrorCode::E107 => "not allowed in this file",
            ErrorCode::E108 => "not allowed here",
            ErrorCode::E109 => "block fill in conditional",
            ErrorCode::E110 => "ternary condition",
            ErrorCode::E111 => "nil-check default",
            ErrorCode::E112 => "invalid expression",
            ErrorCode::E113 => "invalid interpolation",
            ErrorCode::E114 => "invalid mixin parameter",
            ErrorCode::E115 => "duplicate func",
            // Resolution errors
            ErrorCode::E200 => "template not found",
            ErrorCode::E201 => "include not found",
            ErrorCode::E202 => "library not found",
            ErrorCode::E203 => "load failure",
            ErrorCode::E204 => "circular dependency",
            ErrorCode::E205 => "unknown mixin",
            ErrorCode::E206 => "missing use for library",
            // Composition errors
            ErrorCode::E300 => "namespace collision",
            ErrorCode::E301 => "mixin redeclared",
            ErrorCode::E302 => "unknown parameter",
            ErrorCode::E303 => "duplicate parameter",
            ErrorCode::E304 => "missing parameter",
            ErrorCode::E305 => "duplicate block",
            ErrorCode::E306 => "unknown block",
            ErrorCode::E307 => "illegal `&`",
            ErrorCode::E308 => "mixin content",
            ErrorCode::E309 => "void element with body",
            ErrorCode::E310 => "mixin takes no attributes",
            ErrorCode::E311 => "unknown template block",
            // Analysis errors
            ErrorCode::E400 => "mixin recursion",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::E001.to_string(), "E001");
        assert_eq!(ErrorCode::E109.to_string(), "E109");
        assert_eq!(ErrorCode::E205.to_string(), "E205");
        assert_eq!(ErrorCode::E400.to_string(), "E400");
    }

    #[test]
    fn test_error_code_description() {
        assert_eq!(ErrorCode::E003.description(), "mixed indentation");
        assert_eq!(ErrorCode::E206.description(), "missing use for library");
        assert_eq!(ErrorCode::E301.description(), "mixin redeclared");
    }

    #[test]
    fn test_error_codes_order_by_phase() {
        assert!(ErrorCode::E006 < ErrorCode::E100);
        assert!(ErrorCode::E311 < ErrorCode::E400);
    }
}
