mod condition;
mod config;
mod declaration;
mod path;

pub(crate) use path::{insert_at, remove_at};

pub use condition::{Condition, Predicate, Rule, is_truthy, strict_equals};
pub use config::{ConfigError, FormConfig};
pub use declaration::{
    ConditionalField, DynamicSection, FieldArray, FieldCommon, FieldDeclaration, FieldKind,
    ItemFactory, LeafField,
};
pub use path::FieldPath;
