//! Process-wide ODM configuration
//!
//! Controls when string values are coerced into ObjectIds in queries and whether
//! filters are screened for server-side JavaScript operators.
//!
//! # Usage
//! ```
//! use docmodel::{configure, ObjectIdConversionMode};
//!
//! configure(Some(ObjectIdConversionMode::Strict), None);
//! # docmodel::set_config(docmodel::OdmConfig::default());
//! ```

use parking_lot::RwLock;

/// ObjectId conversion mode determines when string-to-ObjectId conversion happens
///
/// # Security Implications
/// - **TypeHinted**: Only converts values explicitly passed as identifiers (RECOMMENDED)
/// - **Lenient**: Auto-converts any 24-char hex string under `_id`
/// - **Strict**: Never converts strings, callers must pass `ObjectId` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectIdConversionMode {
    /// Convert strings only when they are passed through `Query::id` / `Query::ids`
    #[default]
    TypeHinted,

    /// Convert every 24-character hex string found under `_id`
    ///
    /// # Security Risk
    /// Crafted hex strings such as "000000000000000000000000" silently become ids.
    Lenient,

    /// Never convert
    Strict,
}

/// Global ODM configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OdmConfig {
    /// ObjectId conversion mode
    pub objectid_mode: ObjectIdConversionMode,

    /// Whether filters are checked for dangerous operators ($where, $function, ...)
    pub validate_queries: bool,
}

impl OdmConfig {
    const fn new() -> Self {
        Self {
            objectid_mode: ObjectIdConversionMode::TypeHinted,
            validate_queries: true,
        }
    }
}

impl Default for OdmConfig {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_CONFIG: RwLock<OdmConfig> = parking_lot::const_rwlock(OdmConfig::new());

/// Gets a snapshot of the current configuration
pub fn get_config() -> OdmConfig {
    GLOBAL_CONFIG.read().clone()
}

/// Replaces the configuration
pub fn set_config(config: OdmConfig) {
    *GLOBAL_CONFIG.write() = config;
}

/// Updates individual settings, leaving the others untouched
pub fn configure(objectid_mode: Option<ObjectIdConversionMode>, validate_queries: Option<bool>) {
    let mut config = GLOBAL_CONFIG.write();

    if let Some(mode) = objectid_mode {
        if mode == ObjectIdConversionMode::Lenient {
            tracing::warn!("ObjectIdConversionMode::Lenient converts any 24-char hex string under _id");
        }
        config.objectid_mode = mode;
    }

    if let Some(validate) = validate_queries {
        if !validate {
            tracing::warn!("Query validation is disabled; $where and $function filters will reach the server");
        }
        config.validate_queries = validate;
    }
}
