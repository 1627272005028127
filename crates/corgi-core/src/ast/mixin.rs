//! Mixin definitions, mixin calls and the analysis summary attached to mixins.

use std::{
    fmt,
    sync::{Arc, OnceLock, Weak},
};

use serde::{Deserialize, Serialize};

use crate::{
    ast::{Block, Expression, FileKey, LibraryKey, Scope, ScopeItem},
    identifier::Id,
    position::Position,
};

/// A named, parameterized template fragment.
#[derive(Debug)]
pub struct Mixin {
    pub name: Id,
    pub params: Vec<MixinParam>,
    pub body: Scope,
    pub position: Position,
    /// Set once by mixin analysis.
    pub info: OnceLock<MixinInfo>,
}

impl Mixin {
    /// Look up a parameter by name.
    pub fn param(&self, name: Id) -> Option<&MixinParam> {
        self.params.iter().find(|param| param.name == name)
    }

    /// The analysis summary, if analysis has run.
    pub fn info(&self) -> Option<&MixinInfo> {
        self.info.get()
    }
}

#[derive(Debug)]
pub struct MixinParam {
    pub name: Id,
    /// The declared type, or the type inferred from a literal default.
    pub ty: String,
    pub type_inferred: bool,
    pub default: Option<Expression>,
    pub position: Position,
}

impl MixinParam {
    /// A parameter without default must be supplied by every call.
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// A call site: `+name(args)` or `+namespace.name(args)`.
#[derive(Debug)]
pub struct MixinCall {
    pub namespace: Option<Id>,
    pub name: Id,
    pub args: Vec<MixinArg>,
    pub body: Scope,
    pub position: Position,
    /// Set once by the linker.
    pub resolved: OnceLock<ResolvedMixin>,
}

impl MixinCall {
    /// Block fills written directly in the call body.
    pub fn fills(&self) -> impl Iterator<Item = &Block> {
        self.body.iter().filter_map(|item| match item {
            ScopeItem::Block(block) => Some(block),
            _ => None,
        })
    }

    /// The called mixin, once linked.
    pub fn mixin(&self) -> Option<Arc<Mixin>> {
        self.resolved.get().and_then(ResolvedMixin::mixin)
    }
}

impl fmt::Display for MixinCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace {
            Some(namespace) => write!(f, "{namespace}.{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// `name=value` in a mixin call.
#[derive(Debug)]
pub struct MixinArg {
    pub name: Id,
    pub value: Expression,
    pub position: Position,
}

/// The definition a call was bound to.
#[derive(Clone)]
pub struct ResolvedMixin {
    mixin: Weak<Mixin>,
    file: FileKey,
    library: Option<LibraryKey>,
}

impl ResolvedMixin {
    pub fn new(mixin: &Arc<Mixin>, file: FileKey, library: Option<LibraryKey>) -> Self {
        Self {
            mixin: Arc::downgrade(mixin),
            file,
            library,
        }
    }

    /// The mixin, as long as its file is alive.
    pub fn mixin(&self) -> Option<Arc<Mixin>> {
        self.mixin.upgrade()
    }

    /// The file declaring the mixin.
    pub fn file(&self) -> &FileKey {
        &self.file
    }

    /// The library declaring the mixin, for calls resolved through a library.
    pub fn library(&self) -> Option<&LibraryKey> {
        self.library.as_ref()
    }
}

impl fmt::Debug for ResolvedMixin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedMixin")
            .field("mixin", &self.mixin().map(|mixin| mixin.name))
            .field("file", &self.file)
            .field("library", &self.library)
            .finish()
    }
}

/// What a mixin, including everything it calls, may write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixinInfo {
    pub writes_body: bool,
    pub writes_elements: bool,
    pub writes_top_level_attributes: bool,
    pub has_and_placeholders: bool,
    pub top_level_and_placeholder: bool,
    #[serde(default)]
    pub blocks: Vec<MixinBlockInfo>,
}

impl MixinInfo {
    /// Look up a block by name.
    pub fn block(&self, name: Id) -> Option<&MixinBlockInfo> {
        self.blocks.iter().find(|block| block.name == name)
    }
}

/// What a block of a mixin accepts and what its default content writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixinBlockInfo {
    pub name: Id,
    /// No element lies between the block and the mixin body.
    pub top_level: bool,
    /// Nothing was written to the enclosing element's body before the block.
    pub can_attributes: bool,
    pub default_writes_body: bool,
    pub default_writes_elements: bool,
    pub default_writes_top_level_attributes: bool,
    pub default_top_level_and_placeholder: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixin() -> Arc<Mixin> {
        Arc::new(Mixin {
            name: Id::new("Card"),
            params: vec![MixinParam {
                name: Id::new("title"),
                ty: "string".to_string(),
                type_inferred: false,
                default: None,
                position: Position::new(1, 12),
            }],
            body: Scope::default(),
            position: Position::new(1, 1),
            info: OnceLock::new(),
        })
    }

    #[test]
    fn test_param_lookup() {
        let mixin = mixin();
        assert!(mixin.param(Id::new("title")).is_some_and(MixinParam::is_required));
        assert!(mixin.param(Id::new("body")).is_none());
    }

    #[test]
    fn test_resolved_mixin_is_weak() {
        let mixin = mixin();
        let file = FileKey::new("example.com/app", "card.corgi");
        let resolved = ResolvedMixin::new(&mixin, file, None);

        assert!(resolved.mixin().is_some());
        drop(mixin);
        assert!(resolved.mixin().is_none());
    }

    #[test]
    fn test_block_lookup() {
        let info = MixinInfo {
            blocks: vec![MixinBlockInfo {
                name: Id::content_block(),
                top_level: true,
                can_attributes: true,
                default_writes_body: false,
                default_writes_elements: false,
                default_writes_top_level_attributes: false,
                default_top_level_and_placeholder: false,
            }],
            ..MixinInfo::default()
        };

        assert!(info.block(Id::content_block()).is_some());
        assert!(info.block(Id::new("title")).is_none());
    }
}
