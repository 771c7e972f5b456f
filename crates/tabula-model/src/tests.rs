use super::*;
use proptest::prelude::*;

fn all_variants() -> Vec<ColumnKind> {
    vec![
        ColumnKind::smallint(),
        ColumnKind::integer().with_identity(),
        ColumnKind::bigint(),
        ColumnKind::decimal(12, 4),
        ColumnKind::real(),
        ColumnKind::double(),
        ColumnKind::boolean(),
        ColumnKind::varchar(255),
        ColumnKind::text(),
        ColumnKind::Blob,
        ColumnKind::timestamp().with_on_update("CURRENT_TIMESTAMP"),
        ColumnKind::timestamptz(),
        ColumnKind::date(),
        ColumnKind::Json,
        ColumnKind::uuid(),
        ColumnKind::Unknown {
            native_type: "tsvector".to_string(),
            default: None,
        },
    ]
}

#[test]
fn test_column_attributes_are_total() {
    for kind in all_variants() {
        let column = Column::new("c", kind);
        let attrs = column.diff_sensitive_attributes();
        for key in ["type", "nullable", "default"] {
            assert!(
                attrs.contains_key(key),
                "{} is missing {}",
                column.column_type(),
                key
            );
        }
    }
}

#[test]
fn test_column_comment_is_cosmetic() {
    let a = Column::new("email", ColumnKind::varchar(255)).with_comment("login");
    let b = Column::new("email", ColumnKind::varchar(255)).with_comment("contact address");
    assert_eq!(
        a.diff_sensitive_attributes(),
        b.diff_sensitive_attributes()
    );
}

#[test]
fn test_varchar_length_is_sensitive() {
    let a = Column::new("email", ColumnKind::varchar(255));
    let b = Column::new("email", ColumnKind::varchar(100));
    assert_ne!(
        a.diff_sensitive_attributes(),
        b.diff_sensitive_attributes()
    );
}

#[test]
fn test_null_default_differs_from_empty_string() {
    let a = Column::new("note", ColumnKind::text());
    let b = Column::new("note", ColumnKind::text().with_default(""));
    assert_eq!(a.default(), None);
    assert_eq!(b.default(), Some(""));
    assert_ne!(
        a.diff_sensitive_attributes(),
        b.diff_sensitive_attributes()
    );
}

#[test]
fn test_timestamp_attributes() {
    let column = Column::new(
        "updated_at",
        ColumnKind::timestamp()
            .with_default("CURRENT_TIMESTAMP")
            .with_on_update("CURRENT_TIMESTAMP"),
    );
    let attrs = column.diff_sensitive_attributes();
    assert_eq!(attrs["type"], AttrValue::Text("timestamp".into()));
    assert_eq!(attrs["default"], AttrValue::Text("CURRENT_TIMESTAMP".into()));
    assert_eq!(attrs["onUpdate"], AttrValue::Text("CURRENT_TIMESTAMP".into()));
    assert_eq!(column.on_update(), Some("CURRENT_TIMESTAMP"));
}

#[test]
fn test_on_update_only_for_timestamps() {
    let column = Column::new("n", ColumnKind::integer().with_on_update("1"));
    assert_eq!(column.on_update(), None);
}

#[test]
fn test_blob_ignores_default() {
    let column = Column::new("payload", ColumnKind::Blob.with_default("x"));
    assert_eq!(column.default(), None);
}

#[test]
fn test_index_column_order_is_sensitive() {
    let a = Index::new("idx_name", &["first", "last"]);
    let b = Index::new("idx_name", &["last", "first"]);
    assert_ne!(
        a.diff_sensitive_attributes(),
        b.diff_sensitive_attributes()
    );
}

#[test]
fn test_index_column_parse() {
    let col = IndexColumn::parse("created_at DESC");
    assert_eq!(col.name, "created_at");
    assert_eq!(col.order, SortOrder::Desc);

    let col = IndexColumn::parse("id asc");
    assert_eq!(col.name, "id");
    assert_eq!(col.order, SortOrder::Asc);

    let col = IndexColumn::parse(" name ");
    assert_eq!(col.name, "name");
    assert_eq!(col.order, SortOrder::Asc);
}

#[test]
fn test_index_column_to_sql() {
    let quote = |s: &str| format!("\"{}\"", s);
    assert_eq!(IndexColumn::new("name").to_sql(quote), "\"name\"");
    assert_eq!(IndexColumn::desc("created_at").to_sql(quote), "\"created_at\" DESC");
}

#[test]
fn test_foreign_key_attributes() {
    let fk = Constraint::foreign_key("order_customer_fk", &["customer_id"], "customer", &["id"])
        .on_delete(FkAction::Cascade);
    let attrs = fk.diff_sensitive_attributes();
    assert_eq!(attrs["type"], AttrValue::Text("foreign".into()));
    assert_eq!(attrs["refTable"], AttrValue::Text("customer".into()));
    assert_eq!(attrs["onDelete"], AttrValue::Text("CASCADE".into()));
    assert_eq!(fk.referenced_table(), Some("customer"));

    let pk = Constraint::primary_key("customer_pkey", &["id"]);
    assert!(!pk.diff_sensitive_attributes().contains_key("refTable"));
    assert_eq!(pk.referenced_table(), None);
}

#[test]
fn test_fk_action_parse() {
    assert_eq!(FkAction::parse("set null"), Some(FkAction::SetNull));
    assert_eq!(FkAction::parse("SET_DEFAULT"), Some(FkAction::SetDefault));
    assert_eq!(FkAction::parse("c"), Some(FkAction::Cascade));
    assert_eq!(FkAction::parse("a"), Some(FkAction::NoAction));
    assert_eq!(FkAction::parse("explode"), None);
}

#[test]
fn test_schema_references_to() {
    let schema = Schema::new()
        .with_table(Table::new("customer").with_column(Column::new("id", ColumnKind::integer())))
        .with_table(
            Table::new("order")
                .with_column(Column::new("customer_id", ColumnKind::integer()))
                .with_constraint(Constraint::foreign_key(
                    "order_customer_fk",
                    &["customer_id"],
                    "customer",
                    &["id"],
                )),
        );

    let refs: Vec<_> = schema
        .references_to("customer")
        .map(|(t, c)| (t.name.as_str(), c.name.as_str()))
        .collect();
    assert_eq!(refs, vec![("order", "order_customer_fk")]);
    assert_eq!(schema.references_to("order").count(), 0);
}

#[test]
fn test_column_kind_display() {
    assert_eq!(ColumnKind::decimal(12, 4).to_string(), "numeric(12,4)");
    assert_eq!(ColumnKind::varchar(32).to_string(), "varchar(32)");
    assert_eq!(ColumnKind::double().to_string(), "double precision");
    assert_eq!(ColumnKind::timestamptz().to_string(), "timestamptz");
    assert_eq!(ColumnKind::Json.to_string(), "jsonb");
}

// ==================== Normalization ====================

#[test]
fn test_normalize_decimal_zeros() {
    for literal in ["0", "0.0", "0.0000", "-0.00", " 0 "] {
        assert_eq!(normalize_decimal(literal), "0", "literal {:?}", literal);
    }
    assert_eq!(normalize_decimal("12.5000"), "12.5");
    assert_eq!(normalize_decimal("1e3"), "1000");
    assert_eq!(normalize_decimal("abc"), "abc");
}

#[test]
fn test_normalize_integer() {
    assert_eq!(normalize_integer("+007"), "7");
    assert_eq!(normalize_integer("-1"), "-1");
    assert_eq!(normalize_integer(" nextval "), "nextval");
}

#[test]
fn test_normalize_boolean() {
    assert_eq!(normalize_boolean("t"), "true");
    assert_eq!(normalize_boolean("FALSE"), "false");
    assert_eq!(normalize_boolean("0"), "false");
    assert_eq!(normalize_boolean("maybe"), "maybe");
}

#[test]
fn test_normalize_timestamp() {
    assert_eq!(normalize_timestamp("now()"), "CURRENT_TIMESTAMP");
    assert_eq!(normalize_timestamp("current_timestamp"), "CURRENT_TIMESTAMP");
    assert_eq!(normalize_timestamp("2020-01-01"), "2020-01-01 00:00:00");
    assert_eq!(normalize_timestamp("2020-01-01 00:00:00"), "2020-01-01 00:00:00");
    assert_eq!(normalize_timestamp("2020-01-01T12:05"), "2020-01-01 12:05:00");
    assert_eq!(
        normalize_timestamp("2020-01-01 12:05:01.500000"),
        "2020-01-01 12:05:01.5"
    );
    assert_eq!(normalize_timestamp("tomorrow"), "tomorrow");
}

#[test]
fn test_normalize_date() {
    assert_eq!(normalize_date("CURRENT_DATE"), "CURRENT_DATE");
    assert_eq!(normalize_date("2020-01-01"), "2020-01-01");
    assert_eq!(normalize_date("2020-01-01 10:00:00"), "2020-01-01");
}

#[test]
fn test_decimal_default_rounds_to_scale() {
    let normalizers = Normalizers::default();
    let cases = [("1.005", "1.01"), ("-1.005", "-1.01"), ("2.004", "2"), ("7", "7")];
    for (declared, stored) in cases {
        let mut column = Column::new("price", ColumnKind::decimal(10, 2).with_default(declared));
        normalizers.normalize_column(&mut column);
        assert_eq!(column.default(), Some(stored), "declared {:?}", declared);
    }

    // The server's padded spelling lands in the same place.
    let mut column = Column::new("price", ColumnKind::decimal(10, 2).with_default("1.01"));
    normalizers.normalize_column(&mut column);
    assert_eq!(column.default(), Some("1.01"));

    let mut column = Column::new("price", ColumnKind::decimal(10, 2).with_default("1.005"));
    Normalizers::verbatim().normalize_column(&mut column);
    assert_eq!(column.default(), Some("1.005"));
}

#[test]
fn test_normalize_column_covers_on_update() {
    let mut column = Column::new(
        "updated_at",
        ColumnKind::timestamp()
            .with_default("now()")
            .with_on_update("current_timestamp"),
    );
    Normalizers::default().normalize_column(&mut column);
    assert_eq!(column.default(), Some("CURRENT_TIMESTAMP"));
    assert_eq!(column.on_update(), Some("CURRENT_TIMESTAMP"));
}

#[test]
fn test_normalizer_override() {
    let normalizers = Normalizers::default().without_rule(ColumnType::Decimal);
    assert_eq!(normalizers.normalize(ColumnType::Decimal, "0.0000"), "0.0000");

    let normalizers = Normalizers::verbatim().with_rule(ColumnType::Varchar, |s| s.to_lowercase());
    let mut column = Column::new("code", ColumnKind::varchar(8).with_default("ABC"));
    normalizers.normalize_column(&mut column);
    assert_eq!(column.default(), Some("abc"));
}

proptest! {
    #[test]
    fn decimal_padding_never_changes_value(n in -1_000_000i64..1_000_000, zeros in 0usize..6) {
        let padded = if zeros == 0 {
            n.to_string()
        } else {
            format!("{}.{}", n, "0".repeat(zeros))
        };
        prop_assert_eq!(normalize_decimal(&padded), n.to_string());
    }

    #[test]
    fn decimal_normalization_is_idempotent(s in "-?[0-9]{1,6}(\\.[0-9]{1,4})?") {
        let once = normalize_decimal(&s);
        prop_assert_eq!(normalize_decimal(&once), once);
    }
}
