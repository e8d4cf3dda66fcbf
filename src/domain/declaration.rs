use std::fmt;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::condition::Condition;

/// Attributes shared by every leaf widget.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldCommon {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct LeafField {
    #[serde(flatten)]
    pub common: FieldCommon,
    /// Widget specific options, passed through untouched.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalField {
    pub name: String,
    #[serde(flatten)]
    pub condition: Condition,
    pub field: Box<FieldDeclaration>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DynamicSection {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub condition: Condition,
    pub fields: Vec<FieldDeclaration>,
}

/// Produces a fresh item for [`FieldArray`] appends.
#[derive(Clone)]
pub struct ItemFactory(Arc<dyn Fn() -> Value + Send + Sync>);

impl ItemFactory {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(factory))
    }

    pub fn make(&self) -> Value {
        (self.0)()
    }
}

impl fmt::Debug for ItemFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ItemFactory(..)")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldArray {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Item template, resolved once per item under `name.<index>.`.
    pub fields: Vec<FieldDeclaration>,
    #[serde(default)]
    pub min: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<usize>,
    /// Keep item fields registered while the array is hidden.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub always_registered: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub sortable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_item: Option<Value>,
    #[serde(skip)]
    pub item_factory: Option<ItemFactory>,
}

impl FieldArray {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDeclaration>) -> Self {
        Self {
            name: name.into(),
            label: None,
            description: None,
            fields,
            min: 0,
            max: None,
            always_registered: false,
            sortable: false,
            default_item: None,
            item_factory: None,
        }
    }

    pub fn with_min(mut self, min: usize) -> Self {
        self.min = min;
        self
    }

    pub fn with_max(mut self, max: usize) -> Self {
        self.max = Some(max);
        self
    }

    pub fn always_registered(mut self) -> Self {
        self.always_registered = true;
        self
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn with_default_item(mut self, item: Value) -> Self {
        self.default_item = Some(item);
        self
    }

    pub fn with_item_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.item_factory = Some(ItemFactory::new(factory));
        self
    }

    pub fn can_grow(&self, count: usize) -> bool {
        self.max.is_none_or(|max| count < max)
    }

    pub fn can_shrink(&self, count: usize) -> bool {
        count > self.min
    }
}

/// One configured form field or field group.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FieldDeclaration {
    Input(LeafField),
    Textarea(LeafField),
    Select(LeafField),
    Radio(LeafField),
    Checkbox(LeafField),
    Switch(LeafField),
    Date(LeafField),
    File(LeafField),
    Slider(LeafField),
    Conditional(ConditionalField),
    DynamicSection(DynamicSection),
    FieldArray(FieldArray),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Input,
    Textarea,
    Select,
    Radio,
    Checkbox,
    Switch,
    Date,
    File,
    Slider,
    Conditional,
    DynamicSection,
    FieldArray,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Input => "input",
            FieldKind::Textarea => "textarea",
            FieldKind::Select => "select",
            FieldKind::Radio => "radio",
            FieldKind::Checkbox => "checkbox",
            FieldKind::Switch => "switch",
            FieldKind::Date => "date",
            FieldKind::File => "file",
            FieldKind::Slider => "slider",
            FieldKind::Conditional => "conditional",
            FieldKind::DynamicSection => "dynamicSection",
            FieldKind::FieldArray => "fieldArray",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn leaf(name: impl Into<String>) -> LeafField {
    LeafField {
        common: FieldCommon {
            name: name.into(),
            ..FieldCommon::default()
        },
        options: Map::new(),
    }
}

fn choice(name: impl Into<String>, options: impl IntoIterator<Item = impl Into<String>>) -> LeafField {
    let mut field = leaf(name);
    let options: Vec<Value> = options
        .into_iter()
        .map(|option| Value::String(option.into()))
        .collect();
    field.options.insert("options".to_string(), Value::Array(options));
    field
}

impl FieldDeclaration {
    pub fn input(name: impl Into<String>) -> Self {
        FieldDeclaration::Input(leaf(name))
    }

    pub fn textarea(name: impl Into<String>) -> Self {
        FieldDeclaration::Textarea(leaf(name))
    }

    pub fn select(
        name: impl Into<String>,
        options: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        FieldDeclaration::Select(choice(name, options))
    }

    pub fn radio(
        name: impl Into<String>,
        options: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        FieldDeclaration::Radio(choice(name, options))
    }

    pub fn checkbox(name: impl Into<String>) -> Self {
        FieldDeclaration::Checkbox(leaf(name))
    }

    pub fn switch(name: impl Into<String>) -> Self {
        FieldDeclaration::Switch(leaf(name))
    }

    pub fn date(name: impl Into<String>) -> Self {
        FieldDeclaration::Date(leaf(name))
    }

    pub fn file(name: impl Into<String>) -> Self {
        FieldDeclaration::File(leaf(name))
    }

    pub fn slider(name: impl Into<String>, min: f64, max: f64) -> Self {
        let mut field = leaf(name);
        field.options.insert("min".to_string(), json!(min));
        field.options.insert("max".to_string(), json!(max));
        FieldDeclaration::Slider(field)
    }

    pub fn conditional(name: impl Into<String>, condition: Condition, field: FieldDeclaration) -> Self {
        FieldDeclaration::Conditional(ConditionalField {
            name: name.into(),
            condition,
            field: Box::new(field),
        })
    }

    pub fn dynamic_section(
        name: impl Into<String>,
        condition: Condition,
        fields: Vec<FieldDeclaration>,
    ) -> Self {
        FieldDeclaration::DynamicSection(DynamicSection {
            name: name.into(),
            label: None,
            description: None,
            condition,
            fields,
        })
    }

    pub fn field_array(array: FieldArray) -> Self {
        FieldDeclaration::FieldArray(array)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        let label = Some(label.into());
        match &mut self {
            FieldDeclaration::DynamicSection(section) => section.label = label,
            FieldDeclaration::FieldArray(array) => array.label = label,
            other => {
                if let Some(common) = other.common_mut() {
                    common.label = label;
                }
            }
        }
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = Some(description.into());
        match &mut self {
            FieldDeclaration::DynamicSection(section) => section.description = description,
            FieldDeclaration::FieldArray(array) => array.description = description,
            other => {
                if let Some(common) = other.common_mut() {
                    common.description = description;
                }
            }
        }
        self
    }

    /// Default registered for a leaf the first time it becomes visible.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        if let Some(common) = self.common_mut() {
            common.default_value = Some(value.into());
        }
        self
    }

    pub fn disabled(mut self) -> Self {
        if let Some(common) = self.common_mut() {
            common.is_disabled = true;
        }
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Some(leaf) = self.leaf_mut() {
            leaf.options.insert(key.into(), value.into());
        }
        self
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            FieldDeclaration::Input(_) => FieldKind::Input,
            FieldDeclaration::Textarea(_) => FieldKind::Textarea,
            FieldDeclaration::Select(_) => FieldKind::Select,
            FieldDeclaration::Radio(_) => FieldKind::Radio,
            FieldDeclaration::Checkbox(_) => FieldKind::Checkbox,
            FieldDeclaration::Switch(_) => FieldKind::Switch,
            FieldDeclaration::Date(_) => FieldKind::Date,
            FieldDeclaration::File(_) => FieldKind::File,
            FieldDeclaration::Slider(_) => FieldKind::Slider,
            FieldDeclaration::Conditional(_) => FieldKind::Conditional,
            FieldDeclaration::DynamicSection(_) => FieldKind::DynamicSection,
            FieldDeclaration::FieldArray(_) => FieldKind::FieldArray,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FieldDeclaration::Conditional(field) => &field.name,
            FieldDeclaration::DynamicSection(section) => &section.name,
            FieldDeclaration::FieldArray(array) => &array.name,
            _ => self.leaf().map(|leaf| leaf.common.name.as_str()).unwrap_or_default(),
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            FieldDeclaration::Conditional(field) => field.field.label(),
            FieldDeclaration::DynamicSection(section) => section.label.as_deref(),
            FieldDeclaration::FieldArray(array) => array.label.as_deref(),
            _ => self.common().and_then(|common| common.label.as_deref()),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.leaf().is_some()
    }

    pub fn leaf(&self) -> Option<&LeafField> {
        match self {
            FieldDeclaration::Input(leaf)
            | FieldDeclaration::Textarea(leaf)
            | FieldDeclaration::Select(leaf)
            | FieldDeclaration::Radio(leaf)
            | FieldDeclaration::Checkbox(leaf)
            | FieldDeclaration::Switch(leaf)
            | FieldDeclaration::Date(leaf)
            | FieldDeclaration::File(leaf)
            | FieldDeclaration::Slider(leaf) => Some(leaf),
            FieldDeclaration::Conditional(_)
            | FieldDeclaration::DynamicSection(_)
            | FieldDeclaration::FieldArray(_) => None,
        }
    }

    fn leaf_mut(&mut self) -> Option<&mut LeafField> {
        match self {
            FieldDeclaration::Input(leaf)
            | FieldDeclaration::Textarea(leaf)
            | FieldDeclaration::Select(leaf)
            | FieldDeclaration::Radio(leaf)
            | FieldDeclaration::Checkbox(leaf)
            | FieldDeclaration::Switch(leaf)
            | FieldDeclaration::Date(leaf)
            | FieldDeclaration::File(leaf)
            | FieldDeclaration::Slider(leaf) => Some(leaf),
            FieldDeclaration::Conditional(_)
            | FieldDeclaration::DynamicSection(_)
            | FieldDeclaration::FieldArray(_) => None,
        }
    }

    pub fn common(&self) -> Option<&FieldCommon> {
        self.leaf().map(|leaf| &leaf.common)
    }

    fn common_mut(&mut self) -> Option<&mut FieldCommon> {
        self.leaf_mut().map(|leaf| &mut leaf.common)
    }

    /// Nested declarations of composite kinds, empty for leaves.
    pub fn children(&self) -> &[FieldDeclaration] {
        match self {
            FieldDeclaration::Conditional(field) => std::slice::from_ref(field.field.as_ref()),
            FieldDeclaration::DynamicSection(section) => &section.fields,
            FieldDeclaration::FieldArray(array) => &array.fields,
            _ => &[],
        }
    }

    pub fn condition(&self) -> Option<&Condition> {
        match self {
            FieldDeclaration::Conditional(field) => Some(&field.condition),
            FieldDeclaration::DynamicSection(section) => Some(&section.condition),
            _ => None,
        }
    }

    pub fn as_field_array(&self) -> Option<&FieldArray> {
        match self {
            FieldDeclaration::FieldArray(array) => Some(array),
            _ => None,
        }
    }

    /// Value a leaf starts with when nothing is stored yet.
    pub fn initial_value(&self) -> Option<Value> {
        let leaf = self.leaf()?;
        if let Some(default) = &leaf.common.default_value {
            return Some(default.clone());
        }
        let multiple = leaf
            .options
            .get("multiple")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let value = match self.kind() {
            FieldKind::Checkbox | FieldKind::Switch => Value::Bool(false),
            FieldKind::Select if multiple => Value::Array(Vec::new()),
            FieldKind::File => Value::Null,
            FieldKind::Slider => leaf
                .options
                .get("min")
                .filter(|min| min.is_number())
                .cloned()
                .unwrap_or_else(|| json!(0)),
            _ => Value::String(String::new()),
        };
        Some(value)
    }
}

impl From<FieldArray> for FieldDeclaration {
    fn from(array: FieldArray) -> Self {
        FieldDeclaration::FieldArray(array)
    }
}
