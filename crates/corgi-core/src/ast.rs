//! The corgi abstract syntax tree.
//!
//! The parser produces a [`File`] per source file. The tree is immutable after
//! parsing except for a few one-time slots (`OnceLock`) that later stages fill
//! in exactly once:
//!
//! - the linker sets [`Extend::file`], [`UseSpec::library`],
//!   [`Include::target`], [`File::dir_library`], [`File::included_imports`]
//!   and [`MixinCall::resolved`];
//! - mixin analysis sets [`Mixin::info`].

mod expression;
mod file;
mod mixin;
mod scope;
pub mod walk;

pub use expression::{
    ChainExpression, ChainLink, ChainLinkKind, Expression, GoExpression, TernaryExpression,
};
pub use file::{
    Extend, File, FileKey, FileKind, Func, Import, ImportSpec, Library, LibraryKey, RawFile, Use,
    UseNamespace, UseSpec,
};
pub use mixin::{Mixin, MixinArg, MixinBlockInfo, MixinCall, MixinInfo, MixinParam, ResolvedMixin};
pub use scope::{
    And, AndPlaceholder, Attribute, AttributeCollection, Block, BlockKind, Case, Code, Comment,
    CommentKind, Doctype, Element, ElseIf, ExpressionInterpolation, Filter, For, If, IfBlock,
    Include, IncludeTarget, MachineComment, Output, Scope, ScopeItem, Switch, Text, TextItem,
    TextKind, TextLine, VOID_ELEMENTS, While,
};
pub use walk::{Visit, WalkContext, walk};
