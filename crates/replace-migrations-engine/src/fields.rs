//! Field type definitions for model state.
//!
//! A [`FieldDef`] captures every schema-relevant property of a model field.
//! Relational [`FieldType`] variants carry the target model as a dotted
//! `"app_label.model"` reference, or `"settings.NAME"` for a swappable model
//! that is configured per project.

use serde::{Deserialize, Serialize};

/// The prefix used by swappable model references (`"settings.AUTH_USER_MODEL"`).
pub const SETTINGS_PREFIX: &str = "settings.";

/// The type of a model field, determining its column type and behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FieldType {
    /// Auto-incrementing 32-bit integer primary key.
    AutoField,
    /// Auto-incrementing 64-bit integer primary key.
    BigAutoField,
    /// Variable-length string with a max length.
    CharField,
    /// Unlimited-length text.
    TextField,
    /// 32-bit signed integer.
    IntegerField,
    /// 64-bit signed integer.
    BigIntegerField,
    /// 16-bit signed integer.
    SmallIntegerField,
    /// 64-bit floating-point number.
    FloatField,
    /// Fixed-precision decimal number.
    DecimalField {
        /// Maximum total digits.
        max_digits: u32,
        /// Digits after the decimal point.
        decimal_places: u32,
    },
    /// Boolean (true/false).
    BooleanField,
    /// Date without time.
    DateField,
    /// Date and time.
    DateTimeField,
    /// Time without date.
    TimeField,
    /// Duration / interval.
    DurationField,
    /// UUID field.
    UuidField,
    /// Raw binary data.
    BinaryField,
    /// JSON data.
    JsonField,
    /// Email address.
    EmailField,
    /// URL.
    UrlField,
    /// Slug (URL-friendly string).
    SlugField,
    /// Many-to-one relationship.
    ForeignKey {
        /// The target model (e.g. "shop.product" or "settings.AUTH_USER_MODEL").
        to: String,
        /// Behavior when the referenced object is deleted.
        #[serde(default)]
        on_delete: OnDelete,
        /// The name used for the reverse relation.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        related_name: Option<String>,
    },
    /// One-to-one relationship (unique foreign key).
    OneToOneField {
        /// The target model.
        to: String,
        /// Behavior when the referenced object is deleted.
        #[serde(default)]
        on_delete: OnDelete,
        /// The name used for the reverse relation.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        related_name: Option<String>,
    },
    /// Many-to-many relationship (via intermediate table).
    ManyToManyField {
        /// The target model.
        to: String,
        /// Optional explicit intermediate ("through") model.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        through: Option<String>,
        /// The name used for the reverse relation.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        related_name: Option<String>,
    },
}

impl FieldType {
    /// Returns the variant name, e.g. `"CharField"`.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::AutoField => "AutoField",
            Self::BigAutoField => "BigAutoField",
            Self::CharField => "CharField",
            Self::TextField => "TextField",
            Self::IntegerField => "IntegerField",
            Self::BigIntegerField => "BigIntegerField",
            Self::SmallIntegerField => "SmallIntegerField",
            Self::FloatField => "FloatField",
            Self::DecimalField { .. } => "DecimalField",
            Self::BooleanField => "BooleanField",
            Self::DateField => "DateField",
            Self::DateTimeField => "DateTimeField",
            Self::TimeField => "TimeField",
            Self::DurationField => "DurationField",
            Self::UuidField => "UuidField",
            Self::BinaryField => "BinaryField",
            Self::JsonField => "JsonField",
            Self::EmailField => "EmailField",
            Self::UrlField => "UrlField",
            Self::SlugField => "SlugField",
            Self::ForeignKey { .. } => "ForeignKey",
            Self::OneToOneField { .. } => "OneToOneField",
            Self::ManyToManyField { .. } => "ManyToManyField",
        }
    }

    /// Returns the target model reference of a relational field.
    pub fn related_model(&self) -> Option<&str> {
        match self {
            Self::ForeignKey { to, .. }
            | Self::OneToOneField { to, .. }
            | Self::ManyToManyField { to, .. } => Some(to),
            _ => None,
        }
    }
}

/// Behavior when a referenced object is deleted (ON DELETE action).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OnDelete {
    /// Delete all related objects (CASCADE).
    #[default]
    Cascade,
    /// Prevent deletion if related objects exist (PROTECT).
    Protect,
    /// Set the foreign key to NULL.
    SetNull,
    /// Set the foreign key to its default value.
    SetDefault,
    /// Take no action.
    DoNothing,
}

/// A reference from a relational field to another model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationTarget<'a> {
    /// A model of a concrete app.
    Model {
        /// The target app label.
        app_label: &'a str,
        /// The target model name.
        model_name: &'a str,
    },
    /// A swappable model named by a project setting.
    Setting(&'a str),
}

impl<'a> RelationTarget<'a> {
    /// Parses a dotted relation reference.
    ///
    /// A reference without an app label resolves to `default_app`.
    pub fn parse(reference: &'a str, default_app: &'a str) -> Self {
        if let Some(setting) = reference.strip_prefix(SETTINGS_PREFIX) {
            return Self::Setting(setting);
        }
        match reference.split_once('.') {
            Some((app_label, model_name)) => Self::Model {
                app_label,
                model_name,
            },
            None => Self::Model {
                app_label: default_app,
                model_name: reference,
            },
        }
    }
}

/// A schema-relevant field definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// The field name.
    pub name: String,
    /// The database column name, when it differs from the field name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_column: Option<String>,
    /// The field type.
    pub field_type: FieldType,
    /// Whether this field is the primary key.
    #[serde(default, skip_serializing_if = "is_false")]
    pub primary_key: bool,
    /// Whether NULL is allowed.
    #[serde(default, skip_serializing_if = "is_false")]
    pub null: bool,
    /// Default value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Whether a UNIQUE constraint is applied.
    #[serde(default, skip_serializing_if = "is_false")]
    pub unique: bool,
    /// Whether a database index should be created.
    #[serde(default, skip_serializing_if = "is_false")]
    pub db_index: bool,
    /// Maximum character length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
pub(crate) const fn is_false(value: &bool) -> bool {
    !*value
}

impl FieldDef {
    /// Creates a new field definition with sensible defaults.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            db_column: None,
            field_type,
            primary_key: false,
            null: false,
            default: None,
            unique: false,
            db_index: false,
            max_length: None,
        }
    }

    /// Sets the database column name.
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.db_column = Some(column.into());
        self
    }

    /// Marks this field as the primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Allows NULL values.
    pub fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    /// Sets the maximum character length.
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Marks this field as having a UNIQUE constraint.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks this field as having a database index.
    pub fn db_index(mut self) -> Self {
        self.db_index = true;
        self
    }

    /// Sets the default value.
    pub fn default(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Returns the effective database column name.
    pub fn column_name(&self) -> &str {
        self.db_column.as_deref().unwrap_or(&self.name)
    }

    /// Returns `true` if this is a relational field (FK, O2O, M2M).
    pub fn is_relation(&self) -> bool {
        self.field_type.related_model().is_some()
    }

    /// Returns `true` if the two definitions differ only by name.
    pub fn same_shape(&self, other: &Self) -> bool {
        self.field_type == other.field_type
            && self.primary_key == other.primary_key
            && self.null == other.null
            && self.default == other.default
            && self.unique == other.unique
            && self.db_index == other.db_index
            && self.max_length == other.max_length
    }
}

/// A database index definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    /// The index name.
    pub name: String,
    /// The fields included in this index.
    pub fields: Vec<String>,
    /// Whether this is a unique index.
    #[serde(default, skip_serializing_if = "is_false")]
    pub unique: bool,
}

impl Index {
    /// Creates a non-unique index over the given fields.
    pub fn new(name: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            name: name.into(),
            fields: fields.iter().map(|f| (*f).to_string()).collect(),
            unique: false,
        }
    }
}
