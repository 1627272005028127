//! Manifests describing the mixins of a compiled library or file.
//!
//! A manifest carries everything a consumer needs to call into a library
//! without analyzing it again: parameters, the mixin summaries and the
//! blocks. Manifests are serialized as TOML:
//!
//! ```toml
//! module = "example.com/site"
//! path = "ui"
//!
//! [[mixins]]
//! name = "Button"
//! file = "ui/button.corgil"
//! exported = true
//!
//! [[mixins.params]]
//! name = "label"
//! type = "string"
//! required = true
//!
//! [mixins.info]
//! writes_body = true
//! writes_elements = true
//! ...
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use corgi_core::ast::{File, Library, Mixin, MixinInfo, MixinParam};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to write manifest: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid manifest: {0}")]
    Deserialize(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub module: String,
    pub path: String,
    /// Package the generated code is placed in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    /// Name of the function a main file renders to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub func: Option<String>,
    #[serde(default)]
    pub mixins: Vec<MixinManifest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixinManifest {
    pub name: String,
    /// Path of the declaring file, relative to the module.
    pub file: String,
    pub exported: bool,
    #[serde(default)]
    pub params: Vec<ParamManifest>,
    pub info: MixinInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamManifest {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub required: bool,
    /// The default expression as written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl From<&MixinParam> for ParamManifest {
    fn from(param: &MixinParam) -> Self {
        Self {
            name: param.name.to_string(),
            ty: param.ty.clone(),
            required: param.is_required(),
            default: param.default.as_ref().map(ToString::to_string),
        }
    }
}

impl MixinManifest {
    /// Describe an analyzed `mixin` declared in `file`.
    fn new(file: &File, mixin: &Mixin) -> Self {
        Self {
            name: mixin.name.to_string(),
            file: file.path.clone(),
            exported: mixin.name.is_exported(),
            params: mixin.params.iter().map(ParamManifest::from).collect(),
            info: mixin.info().cloned().unwrap_or_default(),
        }
    }
}

impl Manifest {
    /// Describe every top-level mixin of an analyzed library.
    pub fn from_library(library: &Library) -> Self {
        Self {
            module: library.module.clone(),
            path: library.path.clone(),
            package: None,
            func: None,
            mixins: library
                .mixins()
                .map(|(file, mixin)| MixinManifest::new(file, mixin))
                .collect(),
        }
    }

    /// Describe an analyzed main file and its top-level mixins.
    pub fn from_file(file: &File, package: Option<String>) -> Self {
        Self {
            module: file.module.clone(),
            path: file.path.clone(),
            package,
            func: file.func.as_ref().map(|func| func.name.clone()),
            mixins: file
                .top_level_mixins()
                .map(|mixin| MixinManifest::new(file, mixin))
                .collect(),
        }
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    pub fn mixin(&self, name: &str) -> Option<&MixinManifest> {
        self.mixins.iter().find(|mixin| mixin.name == name)
    }

    /// # Errors
    ///
    /// Fails only for values TOML cannot represent.
    pub fn to_toml(&self) -> Result<String, ManifestError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// # Errors
    ///
    /// Returns the TOML error for malformed manifests.
    pub fn from_toml(text: &str) -> Result<Self, ManifestError> {
        Ok(toml::from_str(text)?)
    }
}
