//! Entity definitions shared by storage, validation and routing.
//!
//! Every table is described once as a static [`Entity`]; the REST layer and the
//! SQLite storage are generic over these descriptions.

pub mod decimal;
pub mod entities;

pub use decimal::{DecimalError, FixedPoint};
pub use entities::{entity_by_name, ENTITIES};

/// Column type of a field and the wire/storage conversion that goes with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Auto-increment primary key.
    Id,
    Text { max_length: usize },
    /// Text restricted to a fixed set of codes.
    Choice { choices: &'static [(&'static str, &'static str)] },
    Decimal { max_digits: u32, places: u32 },
    Bool,
    Date,
    DateTime,
    /// Integer reference to another entity's id.
    ForeignKey { target: &'static str },
    /// Write-only text, hashed before it reaches the database.
    Password { max_length: usize },
}

/// Default applied when a field is omitted on create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDefault {
    None,
    Bool(bool),
    /// Scaled decimal value.
    Decimal(i64),
    /// Current UTC time, set by storage on insert.
    Now,
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
    pub unique: bool,
    pub read_only: bool,
    pub default: FieldDefault,
}

impl Field {
    pub const fn new(name: &'static str, column: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            column,
            kind,
            nullable: false,
            unique: false,
            read_only: false,
            default: FieldDefault::None,
        }
    }

    pub const fn text(name: &'static str, max_length: usize) -> Self {
        Self::new(name, name, FieldKind::Text { max_length })
    }

    pub const fn money(name: &'static str) -> Self {
        Self::new(
            name,
            name,
            FieldKind::Decimal {
                max_digits: 16,
                places: 2,
            },
        )
    }

    pub const fn foreign_key(name: &'static str, column: &'static str, target: &'static str) -> Self {
        Self::new(name, column, FieldKind::ForeignKey { target })
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub const fn default(mut self, default: FieldDefault) -> Self {
        self.default = default;
        self
    }

    /// Whole-object writes (POST, PUT) must carry this field.
    pub fn is_required(&self) -> bool {
        !self.read_only && !self.nullable && matches!(self.default, FieldDefault::None)
    }

    pub fn is_write_only(&self) -> bool {
        matches!(self.kind, FieldKind::Password { .. })
    }
}

#[derive(Debug)]
pub struct Entity {
    /// Collection name in URLs, e.g. `marital_status`.
    pub name: &'static str,
    pub table: &'static str,
    /// Human label used in uniqueness messages.
    pub label: &'static str,
    pub fields: &'static [Field],
    pub unique_together: &'static [&'static [&'static str]],
}

impl Entity {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn writable_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| !f.read_only)
    }

    /// Comma-separated column list used by every SELECT.
    pub fn select_columns(&self) -> String {
        self.fields
            .iter()
            .filter(|f| !f.is_write_only())
            .map(|f| f.column)
            .collect::<Vec<_>>()
            .join(", ")
    }
}
