//! Generated sample datasets built from fixed column templates.

use rand::Rng;
use serde_json::Value;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use tabular_structs::{ColumnSchema, ColumnType, FileType, Row, ServiceError};

use crate::{serialized_size, text_form, IngestLimits};

/// Kinds of sample dataset that can be generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
pub enum DatasetKind {
    #[strum(serialize = "Customer Data")]
    CustomerData,
    #[strum(serialize = "Sales Data")]
    SalesData,
    #[strum(serialize = "Product Catalog")]
    ProductCatalog,
}

impl DatasetKind {
    /// Parses a kind by its display name.
    ///
    /// # Errors
    ///
    /// Returns a validation error listing the available kinds.
    pub fn parse(name: &str) -> Result<Self, ServiceError> {
        name.parse().map_err(|_| {
            let available = Self::iter().map(|kind| kind.to_string()).collect::<Vec<_>>();
            ServiceError::validation(format!(
                "Unknown dataset type. Available types: {}",
                available.join(", ")
            ))
        })
    }

    fn template(self) -> &'static [(&'static str, ColumnType)] {
        use ColumnType::{Boolean, Float, Integer, String};

        match self {
            Self::CustomerData => &[
                ("customer_id", String),
                ("age", Integer),
                ("gender", String),
                ("subscription_length", Integer),
                ("monthly_charges", Float),
                ("total_charges", Float),
                ("churn", Boolean),
            ],
            Self::SalesData => &[
                ("order_id", String),
                ("date", String),
                ("customer_name", String),
                ("product_id", String),
                ("quantity", Integer),
                ("unit_price", Float),
                ("total", Float),
                ("discount", Float),
            ],
            Self::ProductCatalog => &[
                ("product_id", String),
                ("name", String),
                ("category", String),
                ("subcategory", String),
                ("price", Float),
                ("stock_quantity", Integer),
                ("rating", Float),
                ("is_available", Boolean),
                ("description", String),
                ("created_date", String),
                ("last_updated", String),
                ("weight", Float),
            ],
        }
    }

    fn filename(self) -> &'static str {
        match self {
            Self::CustomerData => "customer_data.csv",
            Self::SalesData => "sales_data.csv",
            Self::ProductCatalog => "product_catalog.csv",
        }
    }
}

/// A generated dataset with its schema and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticDataset {
    pub name: String,
    pub description: String,
    pub filename: String,
    pub file_type: FileType,
    pub tags: String,
    pub rows: Vec<Row>,
    pub schema: Vec<ColumnSchema>,
    pub size: usize,
}

const SURNAMES: [&str; 15] = [
    "Smith", "Johnson", "Williams", "Jones", "Brown", "Davis", "Miller", "Wilson", "Moore",
    "Taylor", "Anderson", "Thomas", "Jackson", "White", "Harris",
];

const GENDERS: [&str; 3] = ["Male", "Female", "Other"];

const CATEGORIES: [&str; 10] = [
    "Electronics", "Clothing", "Books", "Home", "Food", "Sports", "Beauty", "Toys", "Automotive",
    "Garden",
];

const SUBCATEGORIES: [&str; 10] = [
    "Phones", "T-shirts", "Fiction", "Kitchen", "Snacks", "Outdoor", "Skincare", "Games", "Tools",
    "Plants",
];

const SUBSCRIPTION_MONTHS: [i64; 5] = [1, 3, 6, 12, 24];

const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generates `row_count` rows of the given kind.
///
/// # Errors
///
/// Returns a validation error unless `row_count` is between 1 and the
/// synthetic row limit.
pub fn generate<R: Rng + ?Sized>(
    kind: DatasetKind,
    row_count: usize,
    rng: &mut R,
) -> Result<SyntheticDataset, ServiceError> {
    let limit = IngestLimits::synthetic().max_rows;
    if row_count < 1 || row_count > limit {
        return Err(ServiceError::validation(format!(
            "Number of rows must be between 1 and {limit}"
        )));
    }

    let template = kind.template();
    let rows: Vec<Row> = (0..row_count)
        .map(|index| {
            template
                .iter()
                .map(|&(name, column_type)| {
                    (name.to_string(), generate_value(name, column_type, index, rng))
                })
                .collect()
        })
        .collect();

    let schema = template
        .iter()
        .map(|&(name, column_type)| ColumnSchema {
            name: name.to_string(),
            column_type,
            missing: 0,
            example: rows.first().and_then(|row| row.get(name)).map(text_form),
        })
        .collect();

    tracing::debug!(%kind, rows = row_count, "Generated synthetic dataset");

    Ok(SyntheticDataset {
        name: format!("Random {kind}"),
        description: format!("Randomly generated {kind} with {row_count} rows"),
        filename: kind.filename().to_string(),
        file_type: FileType::Csv,
        tags: kind.to_string().to_lowercase().replace(' ', ","),
        size: serialized_size(&rows),
        rows,
        schema,
    })
}

fn pick<'a, T, R: Rng + ?Sized>(rng: &mut R, options: &'a [T]) -> &'a T {
    &options[rng.gen_range(0..options.len())]
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

/// Value for one cell, chosen by the column's declared type and name.
fn generate_value<R: Rng + ?Sized>(
    name: &str,
    column_type: ColumnType,
    index: usize,
    rng: &mut R,
) -> Value {
    match column_type {
        ColumnType::String => {
            let text = if name.contains("id") {
                let prefix = name.split('_').next().unwrap_or(name).to_uppercase();
                format!("{prefix}{:04}", index + 1)
            } else if name.contains("name") {
                (*pick(rng, &SURNAMES)).to_string()
            } else if name.contains("gender") {
                (*pick(rng, &GENDERS)).to_string()
            } else if name.contains("category") {
                // Also matches "subcategory".
                (*pick(rng, &CATEGORIES)).to_string()
            } else if name.contains("subcategory") {
                (*pick(rng, &SUBCATEGORIES)).to_string()
            } else if name.contains("date") {
                format!("2023-{:02}-{:02}", rng.gen_range(1..=12), rng.gen_range(1..=28))
            } else if name.contains("description") {
                "This is a sample product description.".to_string()
            } else {
                (0..8)
                    .map(|_| char::from(*pick(rng, CODE_CHARSET)))
                    .collect()
            };
            Value::String(text)
        }
        ColumnType::Integer => {
            let number: i64 = if name.contains("age") {
                rng.gen_range(18..=80)
            } else if name.contains("quantity") || name.contains("stock") {
                rng.gen_range(1..=100)
            } else if name.contains("subscription") {
                *pick(rng, &SUBSCRIPTION_MONTHS)
            } else {
                rng.gen_range(1..=1000)
            };
            Value::from(number)
        }
        ColumnType::Float => {
            let number = if name.contains("price") || name.contains("charges") {
                round_to(rng.gen_range(10.0..=200.0), 2)
            } else if name.contains("discount") {
                round_to(rng.gen_range(0.0..=0.3), 2)
            } else if name.contains("total") {
                round_to(rng.gen_range(50.0..=1000.0), 2)
            } else if name.contains("rating") {
                round_to(rng.gen_range(1.0..=5.0), 1)
            } else if name.contains("weight") {
                round_to(rng.gen_range(0.1..=10.0), 2)
            } else {
                round_to(rng.gen_range(0.0..=100.0), 2)
            };
            Value::from(number)
        }
        ColumnType::Boolean => {
            let flag = if name.contains("churn") {
                rng.gen::<f64>() > 0.7
            } else {
                rng.gen()
            };
            Value::Bool(flag)
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_parse_kind_by_display_name() {
        assert_eq!(
            DatasetKind::parse("Sales Data").expect("known kind"),
            DatasetKind::SalesData
        );

        let err = DatasetKind::parse("Weather").expect_err("unknown kind");
        assert!(matches!(
            err,
            ServiceError::Validation(message)
                if message.contains("Customer Data, Sales Data, Product Catalog")
        ));
    }

    #[test]
    fn test_generate_customer_data() {
        let mut rng = StdRng::seed_from_u64(7);
        let dataset = generate(DatasetKind::CustomerData, 25, &mut rng).expect("valid row count");

        assert_eq!(dataset.name, "Random Customer Data");
        assert_eq!(dataset.filename, "customer_data.csv");
        assert_eq!(dataset.tags, "customer,data");
        assert_eq!(dataset.rows.len(), 25);
        assert_eq!(dataset.schema.len(), 7);
        assert_eq!(dataset.size, serialized_size(&dataset.rows));

        let first = &dataset.rows[0];
        assert_eq!(first["customer_id"], Value::from("CUSTOMER0001"));
        assert_eq!(dataset.rows[24]["customer_id"], Value::from("CUSTOMER0025"));

        for row in &dataset.rows {
            let age = row["age"].as_i64().expect("age is an integer");
            assert!((18..=80).contains(&age));
            let months = row["subscription_length"].as_i64().expect("integer");
            assert!(SUBSCRIPTION_MONTHS.contains(&months));
            assert!(row["churn"].is_boolean());
        }

        let churn = dataset.schema.iter().find(|c| c.name == "churn").expect("churn column");
        assert_eq!(churn.column_type, ColumnType::Boolean);
        assert_eq!(churn.missing, 0);
        assert_eq!(churn.example.as_deref(), Some(text_form(&first["churn"]).as_str()));
    }

    #[test]
    fn test_product_catalog_string_columns() {
        let mut rng = StdRng::seed_from_u64(11);
        let dataset = generate(DatasetKind::ProductCatalog, 10, &mut rng).expect("valid row count");

        for row in &dataset.rows {
            let category = row["subcategory"].as_str().expect("string");
            assert!(CATEGORIES.contains(&category));
            let updated = row["last_updated"].as_str().expect("string");
            let (year, day) = updated.split_at(5);
            assert_eq!(year, "2023-");
            assert_eq!(updated.len(), 10);
            let month: u32 = day[..2].parse().expect("month");
            let day: u32 = day[3..].parse().expect("day");
            assert!((1..=12).contains(&month));
            assert!((1..=28).contains(&day));
            let rating = row["rating"].as_f64().expect("float");
            assert!((1.0..=5.0).contains(&rating));
        }
    }

    #[test]
    fn test_unmatched_string_column_gets_code() {
        let mut rng = StdRng::seed_from_u64(5);
        let value = generate_value("sku", ColumnType::String, 0, &mut rng);

        let code = value.as_str().expect("string");
        assert_eq!(code.len(), 8);
        assert!(code.bytes().all(|b| CODE_CHARSET.contains(&b)));
    }

    #[test]
    fn test_row_count_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(generate(DatasetKind::SalesData, 0, &mut rng).is_err());
        assert!(generate(DatasetKind::SalesData, 2001, &mut rng).is_err());
        assert!(generate(DatasetKind::SalesData, 2000, &mut rng).is_ok());
    }
}
