use super::{Entity, Field, FieldDefault, FieldKind};
use once_cell::sync::Lazy;
use std::collections::HashMap;

const ID: Field = Field::new("id", "id", FieldKind::Id).read_only();
const CREATED_AT: Field = Field::new("created_at", "created_at", FieldKind::DateTime)
    .read_only()
    .default(FieldDefault::Now);
const MODIFIED_AT: Field = Field::new("modified_at", "modified_at", FieldKind::DateTime)
    .read_only()
    .default(FieldDefault::Now);
const ACTIVE: Field = Field::new("active", "active", FieldKind::Bool).default(FieldDefault::Bool(true));

/// Prepends the columns every table carries.
macro_rules! fields {
    ($($field:expr),* $(,)?) => {
        &[ID, CREATED_AT, MODIFIED_AT, ACTIVE, $($field),*]
    };
}

pub const GENDER_CHOICES: &[(&str, &str)] = &[("M", "Male"), ("F", "Female")];

pub static ZONE: Entity = Entity {
    name: "zone",
    table: "zone",
    label: "zone",
    fields: fields![Field::text("name", 32).unique()],
    unique_together: &[],
};

pub static STATE: Entity = Entity {
    name: "state",
    table: "state",
    label: "state",
    fields: fields![
        Field::foreign_key("zone", "id_zone", "zone").nullable(),
        Field::text("name", 56).unique(),
        Field::text("abbreviation", 2),
    ],
    unique_together: &[],
};

pub static CITY: Entity = Entity {
    name: "city",
    table: "city",
    label: "city",
    fields: fields![
        Field::foreign_key("state", "id_state", "state"),
        Field::text("name", 56),
    ],
    unique_together: &[&["state", "name"]],
};

pub static DISTRICT: Entity = Entity {
    name: "district",
    table: "district",
    label: "district",
    fields: fields![
        Field::foreign_key("state", "id_state", "state"),
        Field::foreign_key("city", "id_city", "city"),
        Field::text("name", 64),
    ],
    unique_together: &[],
};

pub static MARITAL_STATUS: Entity = Entity {
    name: "marital_status",
    table: "marital_status",
    label: "marital status",
    fields: fields![Field::text("description", 36).unique()],
    unique_together: &[],
};

pub static CUSTOMER: Entity = Entity {
    name: "customer",
    table: "customer",
    label: "customer",
    fields: fields![
        Field::foreign_key("district", "id_district", "district"),
        Field::foreign_key("marital_status", "id_marital_status", "marital_status"),
        Field::text("name", 64),
        Field::money("monthly_income"),
        Field::new(
            "gender",
            "gender",
            FieldKind::Choice {
                choices: GENDER_CHOICES
            }
        ),
    ],
    unique_together: &[],
};

pub static DEPARTMENT: Entity = Entity {
    name: "department",
    table: "department",
    label: "department",
    fields: fields![Field::text("name", 56).unique()],
    unique_together: &[],
};

pub static BRANCH: Entity = Entity {
    name: "branch",
    table: "branch",
    label: "branch",
    fields: fields![
        Field::foreign_key("district", "id_district", "district"),
        Field::text("name", 64),
    ],
    unique_together: &[],
};

pub static SUPPLIER: Entity = Entity {
    name: "supplier",
    table: "supplier",
    label: "supplier",
    fields: fields![
        Field::foreign_key("district", "id_district", "district"),
        Field::text("name", 56),
        Field::text("legal_document", 20).unique(),
    ],
    unique_together: &[],
};

pub static EMPLOYEE: Entity = Entity {
    name: "employee",
    table: "employee",
    label: "employee",
    fields: fields![
        Field::foreign_key("department", "id_department", "department"),
        Field::foreign_key("marital_status", "id_marital_status", "marital_status"),
        Field::foreign_key("manager", "id_manager", "employee").nullable(),
        Field::text("name", 56),
        Field::money("salary"),
        Field::text("login", 56).unique(),
        Field::new("password", "password", FieldKind::Password { max_length: 256 }),
        Field::new("admission_date", "admission_date", FieldKind::Date).nullable(),
        Field::new("birth_date", "birth_date", FieldKind::Date),
        Field::new("is_superuser", "is_superuser", FieldKind::Bool).default(FieldDefault::Bool(false)),
        Field::new("is_staff", "is_staff", FieldKind::Bool).default(FieldDefault::Bool(false)),
        Field::new("last_login", "last_login", FieldKind::DateTime)
            .nullable()
            .read_only(),
    ],
    unique_together: &[],
};

pub static PRODUCT_GROUP: Entity = Entity {
    name: "product_group",
    table: "product_group",
    label: "product group",
    fields: fields![
        Field::text("description", 40).unique(),
        Field::money("percentage_comission"),
        Field::money("percentage_gain"),
    ],
    unique_together: &[],
};

pub static PRODUCT: Entity = Entity {
    name: "product",
    table: "product",
    label: "product",
    fields: fields![
        Field::foreign_key("product_group", "id_product_group", "product_group"),
        Field::foreign_key("supplier", "id_supplier", "supplier"),
        Field::text("name", 256),
        Field::money("cost_price"),
        Field::money("sale_price"),
    ],
    unique_together: &[],
};

pub static SALE: Entity = Entity {
    name: "sale",
    table: "sale",
    label: "sale",
    fields: fields![
        Field::foreign_key("branch", "id_branch", "branch"),
        Field::foreign_key("customer", "id_customer", "customer"),
        Field::new("date", "date", FieldKind::DateTime)
            .read_only()
            .default(FieldDefault::Now),
        Field::money("total").default(FieldDefault::Decimal(0)),
    ],
    unique_together: &[],
};

pub static SALE_ITEM: Entity = Entity {
    name: "sale_item",
    table: "sale_item",
    label: "sale item",
    fields: fields![
        Field::foreign_key("sale", "id_sale", "sale"),
        Field::foreign_key("product", "id_product", "product"),
        Field::new(
            "quantity",
            "quantity",
            FieldKind::Decimal {
                max_digits: 16,
                places: 3
            }
        ),
        Field::money("subtotal").default(FieldDefault::Decimal(0)),
    ],
    unique_together: &[],
};

/// Every exposed collection, in URL registration order.
pub static ENTITIES: &[&Entity] = &[
    &BRANCH,
    &CITY,
    &CUSTOMER,
    &DEPARTMENT,
    &DISTRICT,
    &EMPLOYEE,
    &MARITAL_STATUS,
    &PRODUCT,
    &PRODUCT_GROUP,
    &SALE,
    &SALE_ITEM,
    &STATE,
    &SUPPLIER,
    &ZONE,
];

static BY_NAME: Lazy<HashMap<&'static str, &'static Entity>> =
    Lazy::new(|| ENTITIES.iter().map(|e| (e.name, *e)).collect());

pub fn entity_by_name(name: &str) -> Option<&'static Entity> {
    BY_NAME.get(name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_fourteen_collections() {
        assert_eq!(ENTITIES.len(), 14);
        assert!(entity_by_name("sale_item").is_some());
        assert!(entity_by_name("admin").is_none());
    }

    #[test]
    fn every_foreign_key_points_at_a_registered_entity() {
        for entity in ENTITIES {
            for field in entity.fields {
                if let FieldKind::ForeignKey { target } = field.kind {
                    assert!(
                        entity_by_name(target).is_some(),
                        "{}.{} points at unknown {}",
                        entity.name,
                        field.name,
                        target
                    );
                }
            }
        }
    }

    #[test]
    fn every_entity_carries_common_columns() {
        for entity in ENTITIES {
            for name in ["id", "created_at", "modified_at", "active"] {
                assert!(entity.field(name).is_some(), "{} lacks {}", entity.name, name);
            }
        }
    }

    #[test]
    fn password_is_excluded_from_selects() {
        assert!(!EMPLOYEE.select_columns().contains("password"));
        assert!(EMPLOYEE.select_columns().contains("id_manager"));
    }
}
