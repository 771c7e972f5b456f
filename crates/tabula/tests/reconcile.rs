//! End-to-end reconciliation against in-memory catalogs.
//!
//! `MemoryCatalog` only records DDL, so after each run the tests move the
//! catalog forward with the simulated result of the plan, then check that
//! the next run has nothing left to do.

use std::sync::Arc;
use tabula::catalog::{RawColumn, RawTable};
use tabula::{
    ApplyReport, Column, ColumnKind, Constraint, DeclarationSource, Error, FileDeclarations,
    Index, MemoryCatalog, Planner, Reconciler, Schema, SchemaReader, Shard, Sharding, Table,
    simulate,
};

const SHOP: &str = r#"
tables {
    customer {
        comment "Registered customers"
        columns {
            id {type integer, identity true}
            email {type varchar, length 100, nullable false}
            balance {type decimal, precision 12, scale 4, default "0"}
            active {type boolean, default true}
            updated_at {type timestamp, default CURRENT_TIMESTAMP, on_update CURRENT_TIMESTAMP}
        }
        indexes {
            customer_email_idx {columns (email), unique true}
        }
        constraints {
            customer_pkey {type primary, columns (id)}
        }
    }
    order {
        columns {
            id {type bigint, identity true}
            customer_id {type integer, nullable false}
            total {type decimal, precision 12, scale 2, default "-0.50"}
        }
        constraints {
            order_pkey {type primary, columns (id)}
            order_customer_fk {type foreign, columns (customer_id), references customer, ref_columns (id), on_delete cascade}
        }
    }
}
"#;

/// Run one reconcile and move every catalog to the state the plan leads to.
async fn converge<D: DeclarationSource>(
    reconciler: &Reconciler<D>,
    catalogs: &[(&str, &MemoryCatalog)],
) -> ApplyReport {
    let plan = reconciler.plan().await.unwrap();

    let session = reconciler.sharding().session();
    let reader = SchemaReader::default();
    let mut expected = Vec::new();
    for (shard, operations) in &plan.shards {
        let actual = reader.read(&session, shard).await.unwrap();
        expected.push((shard.clone(), simulate(&actual, operations).unwrap()));
    }

    let report = reconciler.reconcile().await.unwrap();
    for (shard, schema) in expected {
        let (_, catalog) = catalogs
            .iter()
            .find(|(name, _)| *name == shard.name())
            .unwrap();
        catalog.set_schema(&schema);
    }
    report
}

fn operations(plan: &tabula::Plan, shard: &str) -> Vec<String> {
    plan.operations(&Shard::new(shard))
        .iter()
        .map(ToString::to_string)
        .collect()
}

#[tokio::test]
async fn test_install_then_nothing_to_do() {
    let catalog = Arc::new(MemoryCatalog::new());
    let sharding = Sharding::single(catalog.clone());
    let reconciler = Reconciler::new(sharding, FileDeclarations::parse(SHOP).unwrap());

    let plan = reconciler.plan().await.unwrap();
    assert_eq!(
        operations(&plan, "default"),
        [
            "create table customer",
            "create table order",
            "add index customer.customer_email_idx",
            "add constraint order.order_customer_fk",
        ]
    );

    let report = converge(&reconciler, &[("default", &catalog)]).await;
    assert!(report.is_success());
    assert_eq!(report.applied(), 4);

    let executed = catalog.executed();
    assert!(executed[0].starts_with("CREATE TABLE \"customer\""));
    assert!(
        executed
            .iter()
            .any(|sql| sql.contains("CREATE TRIGGER \"trg_onupd_customer_updated_at\""))
    );
    assert!(
        executed
            .iter()
            .any(|sql| sql.contains("REFERENCES \"customer\" (\"id\") ON DELETE CASCADE"))
    );

    let diff = reconciler.diff().await.unwrap();
    assert!(diff.get().is_none(), "{}", diff);

    let executed_before = catalog.executed().len();
    let second = reconciler.reconcile().await.unwrap();
    assert!(second.is_success());
    assert_eq!(second.applied(), 0);
    assert_eq!(catalog.executed().len(), executed_before);
}

#[tokio::test]
async fn test_shrinking_a_varchar_is_one_modification() {
    let actual = Schema::new().with_table(
        Table::new("customer")
            .with_column(Column::new("id", ColumnKind::integer()).not_null())
            .with_column(Column::new("email", ColumnKind::varchar(255))),
    );
    let declared = Schema::new().with_table(
        Table::new("customer")
            .with_column(Column::new("id", ColumnKind::integer()).not_null())
            .with_column(Column::new("email", ColumnKind::varchar(100))),
    );
    let catalog = Arc::new(MemoryCatalog::from_schema(&actual));
    let reconciler = Reconciler::new(Sharding::single(catalog.clone()), declared);

    let diff = reconciler.diff().await.unwrap();
    assert_eq!(diff.change_count(), 1);

    let plan = reconciler.plan().await.unwrap();
    assert_eq!(
        operations(&plan, "default"),
        ["modify column customer.email"]
    );

    converge(&reconciler, &[("default", &catalog)]).await;
    assert!(
        catalog
            .executed()
            .iter()
            .any(|sql| sql.contains("ALTER COLUMN \"email\" TYPE varchar(100)"))
    );
    assert!(reconciler.diff().await.unwrap().get().is_none());
}

#[tokio::test]
async fn test_index_is_dropped_before_its_column() {
    let actual = Schema::new().with_table(
        Table::new("customer")
            .with_column(Column::new("id", ColumnKind::integer()).not_null())
            .with_column(Column::new("legacy", ColumnKind::text()))
            .with_index(Index::new("customer_legacy_idx", &["legacy"])),
    );
    let declared = Schema::new().with_table(
        Table::new("customer").with_column(Column::new("id", ColumnKind::integer()).not_null()),
    );
    let catalog = Arc::new(MemoryCatalog::from_schema(&actual));
    let reconciler = Reconciler::new(Sharding::single(catalog.clone()), declared);

    let plan = reconciler.plan().await.unwrap();
    assert_eq!(
        operations(&plan, "default"),
        [
            "drop index customer.customer_legacy_idx",
            "drop column customer.legacy",
        ]
    );

    converge(&reconciler, &[("default", &catalog)]).await;
    assert!(reconciler.diff().await.unwrap().get().is_none());
}

#[tokio::test]
async fn test_undeclared_table_is_dropped() {
    let actual = Schema::new().with_table(
        Table::new("legacy").with_column(Column::new("id", ColumnKind::integer())),
    );
    let catalog = Arc::new(MemoryCatalog::from_schema(&actual));
    let reconciler = Reconciler::new(Sharding::single(catalog.clone()), Schema::new());

    let plan = reconciler.plan().await.unwrap();
    assert_eq!(operations(&plan, "default"), ["drop table legacy"]);

    converge(&reconciler, &[("default", &catalog)]).await;
    assert_eq!(catalog.executed(), ["DROP TABLE \"legacy\""]);
    assert!(reconciler.diff().await.unwrap().get().is_none());
}

#[tokio::test]
async fn test_changes_run_as_ddl() {
    let actual = Schema::new()
        .with_table(
            Table::new("customer")
                .with_column(Column::new("id", ColumnKind::integer()).not_null())
                .with_column(Column::new("email", ColumnKind::varchar(255)))
                .with_column(Column::new("legacy", ColumnKind::text()))
                .with_column(Column::new(
                    "created_at",
                    ColumnKind::timestamp().with_default("now()"),
                ))
                .with_index(Index::new("customer_legacy_idx", &["legacy"])),
        )
        .with_table(Table::new("obsolete").with_column(Column::new("id", ColumnKind::integer())));
    let declared = Schema::new().with_table(
        Table::new("customer")
            .unlogged()
            .with_column(Column::new("id", ColumnKind::integer()).not_null())
            .with_column(Column::new("email", ColumnKind::varchar(100)))
            .with_column(Column::new(
                "created_at",
                ColumnKind::timestamp().with_default("CURRENT_TIMESTAMP"),
            ))
            .with_column(Column::new("nickname", ColumnKind::varchar(32))),
    );
    let catalog = Arc::new(MemoryCatalog::from_schema(&actual));
    let reconciler = Reconciler::new(Sharding::single(catalog.clone()), declared);

    let report = converge(&reconciler, &[("default", &catalog)]).await;
    assert_eq!(report.applied(), 6);
    insta::assert_snapshot!(catalog.executed().join(";\n"), @r#"
    DROP INDEX "customer_legacy_idx";
    ALTER TABLE "customer" DROP COLUMN "legacy";
    DROP TABLE "obsolete";
    ALTER TABLE "customer" SET UNLOGGED;
    ALTER TABLE "customer" ADD COLUMN "nickname" varchar(32);
    ALTER TABLE "customer" ALTER COLUMN "email" TYPE varchar(100)
    "#);
    assert!(reconciler.diff().await.unwrap().get().is_none());
}

#[tokio::test]
async fn test_serial_column_declared_plain_loses_its_sequence() {
    let catalog = Arc::new(MemoryCatalog::new());
    catalog.insert_raw_table(
        RawTable {
            name: "ticket".into(),
            unlogged: false,
            comment: None,
        },
        vec![RawColumn {
            nullable: false,
            ..raw_column("id", "int4", "integer", "nextval('ticket_id_seq'::regclass)")
        }],
    );
    let declared = Schema::new()
        .with_table(Table::new("ticket").with_column(Column::new("id", ColumnKind::integer()).not_null()));
    let reconciler = Reconciler::new(Sharding::single(catalog.clone()), declared);

    let plan = reconciler.plan().await.unwrap();
    assert_eq!(operations(&plan, "default"), ["modify column ticket.id"]);

    converge(&reconciler, &[("default", &catalog)]).await;
    assert_eq!(
        catalog.executed(),
        [
            "ALTER TABLE \"ticket\" ALTER COLUMN \"id\" DROP IDENTITY IF EXISTS",
            "ALTER TABLE \"ticket\" ALTER COLUMN \"id\" DROP DEFAULT",
        ]
    );
    assert!(reconciler.diff().await.unwrap().get().is_none());
}

fn raw_column(name: &str, udt_name: &str, data_type: &str, default: &str) -> RawColumn {
    RawColumn {
        name: name.to_string(),
        ordinal: 1,
        udt_name: udt_name.to_string(),
        data_type: data_type.to_string(),
        char_length: None,
        numeric_precision: None,
        numeric_scale: None,
        nullable: true,
        default: Some(default.to_string()),
        identity: false,
        comment: None,
    }
}

#[tokio::test]
async fn test_server_spellings_match_declared_defaults() {
    let catalog = Arc::new(MemoryCatalog::new());
    catalog.insert_raw_table(
        RawTable {
            name: "event".into(),
            unlogged: false,
            comment: None,
        },
        vec![
            raw_column(
                "created_at",
                "timestamp",
                "timestamp without time zone",
                "now()",
            ),
            RawColumn {
                ordinal: 2,
                ..raw_column("attempts", "int4", "integer", "'-1'::integer")
            },
            RawColumn {
                ordinal: 3,
                numeric_precision: Some(12),
                numeric_scale: Some(4),
                ..raw_column("amount", "numeric", "numeric", "1.5000")
            },
            RawColumn {
                ordinal: 4,
                ..raw_column("enabled", "bool", "boolean", "true")
            },
            RawColumn {
                ordinal: 5,
                ..raw_column("label", "text", "text", "'it''s'::text")
            },
            RawColumn {
                ordinal: 6,
                ..raw_column(
                    "starts_at",
                    "timestamp",
                    "timestamp without time zone",
                    "'2020-01-01 00:00:00'::timestamp without time zone",
                )
            },
            RawColumn {
                ordinal: 7,
                ..raw_column("due_on", "date", "date", "'2020-01-01'::date")
            },
            RawColumn {
                ordinal: 8,
                numeric_precision: Some(10),
                numeric_scale: Some(2),
                ..raw_column("price", "numeric", "numeric", "1.01")
            },
        ],
    );

    let declared = Schema::new().with_table(
        Table::new("event")
            .with_column(Column::new(
                "created_at",
                ColumnKind::timestamp().with_default("CURRENT_TIMESTAMP"),
            ))
            .with_column(Column::new(
                "attempts",
                ColumnKind::integer().with_default("-1"),
            ))
            .with_column(Column::new(
                "amount",
                ColumnKind::decimal(12, 4).with_default("1.50"),
            ))
            .with_column(Column::new(
                "enabled",
                ColumnKind::boolean().with_default("1"),
            ))
            .with_column(Column::new("label", ColumnKind::text().with_default("it's")))
            .with_column(Column::new(
                "starts_at",
                ColumnKind::timestamp().with_default("2020-01-01"),
            ))
            .with_column(Column::new(
                "due_on",
                ColumnKind::date().with_default("2020-01-01"),
            ))
            // Stored rounded to the column's scale.
            .with_column(Column::new(
                "price",
                ColumnKind::decimal(10, 2).with_default("1.005"),
            )),
    );
    let reconciler = Reconciler::new(Sharding::single(catalog), declared);

    let diff = reconciler.diff().await.unwrap();
    assert!(diff.get().is_none(), "{}", diff);
}

#[tokio::test]
async fn test_unsupported_column_type_is_always_modified() {
    let catalog = Arc::new(MemoryCatalog::new());
    catalog.insert_raw_table(
        RawTable {
            name: "area".into(),
            unlogged: false,
            comment: None,
        },
        vec![RawColumn {
            default: None,
            ..raw_column("shape", "polygon", "polygon", "")
        }],
    );
    let declared = Schema::new().with_table(Table::new("area").with_column(Column::new(
        "shape",
        ColumnKind::Unknown {
            native_type: "polygon".into(),
            default: None,
        },
    )));
    let reconciler = Reconciler::new(Sharding::single(catalog), declared);

    for _ in 0..2 {
        let diff = reconciler.diff().await.unwrap();
        assert_eq!(diff.change_count(), 1);
    }
    let plan = reconciler.plan().await.unwrap();
    assert_eq!(operations(&plan, "default"), ["modify column area.shape"]);
}

const SHARDED: &str = r#"
tables {
    a {columns {id {type integer}}}
    b {columns {id {type integer}}}
    c {columns {id {type integer}}}
    invoice {
        shard sales
        columns {id {type bigint}}
    }
    snapshot {
        shard archive
        columns {id {type bigint}}
    }
}
"#;

#[tokio::test]
async fn test_failures_stay_on_their_shard() {
    let main = Arc::new(MemoryCatalog::new());
    let sales = Arc::new(MemoryCatalog::new());
    let archive = Arc::new(MemoryCatalog::new());
    main.fail_on("CREATE TABLE \"b\"");
    archive.set_unreachable(true);

    let sharding = Sharding::new("main", main.clone())
        .with_shard("sales", sales.clone())
        .with_shard("archive", archive.clone());
    let reconciler = Reconciler::new(sharding, FileDeclarations::parse(SHARDED).unwrap());

    let report = reconciler.reconcile().await.unwrap();
    assert!(!report.is_success());

    let main_outcome = &report.outcomes[&Shard::new("main")];
    assert_eq!(main_outcome.applied, 1);
    assert_eq!(main_outcome.skipped, 1);
    assert!(matches!(
        &main_outcome.error,
        Some(Error::Apply { operation, .. }) if operation == "create table b"
    ));
    assert_eq!(main.executed().len(), 1);

    let sales_outcome = &report.outcomes[&Shard::new("sales")];
    assert!(!sales_outcome.failed());
    assert_eq!(sales.executed(), ["CREATE TABLE \"invoice\" (\n    \"id\" bigint\n)"]);

    let archive_outcome = &report.outcomes[&Shard::new("archive")];
    assert!(matches!(
        &archive_outcome.error,
        Some(Error::Introspection { shard, .. }) if shard.name() == "archive"
    ));
    assert!(archive.executed().is_empty());

    let failed: Vec<&str> = report.failures().map(|(shard, _)| shard.name()).collect();
    assert_eq!(failed, ["main", "archive"]);
}

#[tokio::test]
async fn test_previews_cover_every_shard_or_fail() {
    let main = Arc::new(MemoryCatalog::new());
    let sales = Arc::new(MemoryCatalog::new());
    let archive = Arc::new(MemoryCatalog::new());
    archive.set_unreachable(true);

    let sharding = Sharding::new("main", main.clone())
        .with_shard("sales", sales.clone())
        .with_shard("archive", archive.clone());
    let reconciler = Reconciler::new(sharding, FileDeclarations::parse(SHARDED).unwrap());

    let err = reconciler.diff().await.unwrap_err();
    assert!(
        matches!(&err, Error::Introspection { shard, .. } if shard.name() == "archive"),
        "{}",
        err
    );
    let err = reconciler.plan().await.unwrap_err();
    assert!(
        matches!(&err, Error::Introspection { shard, .. } if shard.name() == "archive"),
        "{}",
        err
    );
    assert!(main.executed().is_empty());
    assert!(sales.executed().is_empty());

    archive.set_unreachable(false);
    let plan = reconciler.plan().await.unwrap();
    assert!(!plan.operations(&Shard::new("archive")).is_empty());
}

#[tokio::test]
async fn test_every_call_reads_afresh() {
    let schema = Schema::new()
        .with_table(Table::new("t").with_column(Column::new("id", ColumnKind::integer())));
    let catalog = Arc::new(MemoryCatalog::from_schema(&schema));
    let reconciler = Reconciler::new(Sharding::single(catalog.clone()), schema);

    reconciler.diff().await.unwrap();
    let first = catalog.read_count();
    assert!(first > 0);

    reconciler.diff().await.unwrap();
    assert_eq!(catalog.read_count(), first * 2);
}

const CYCLE: &str = r#"
tables {
    author {
        columns {
            id {type integer}
            favorite_book_id {type integer}
        }
        constraints {
            author_pkey {type primary, columns (id)}
            author_favorite_book_fk {type foreign, columns (favorite_book_id), references book, ref_columns (id)}
        }
    }
    book {
        columns {
            id {type integer}
            author_id {type integer}
        }
        constraints {
            book_pkey {type primary, columns (id)}
            book_author_fk {type foreign, columns (author_id), references author, ref_columns (id)}
        }
    }
}
"#;

#[tokio::test]
async fn test_mutual_references_need_split_foreign_keys() {
    let catalog = Arc::new(MemoryCatalog::new());
    let declarations = FileDeclarations::parse(CYCLE).unwrap();

    let split = Reconciler::new(Sharding::single(catalog.clone()), declarations.clone());
    let plan = split.plan().await.unwrap();
    assert_eq!(
        operations(&plan, "default"),
        [
            "create table author",
            "create table book",
            "add constraint author.author_favorite_book_fk",
            "add constraint book.book_author_fk",
        ]
    );

    let inline = Reconciler::new(Sharding::single(catalog.clone()), declarations)
        .with_planner(Planner::new().split_foreign_keys(false));
    let err = inline.plan().await.unwrap_err();
    assert!(err.is_cycle(), "{}", err);

    let report = inline.reconcile().await.unwrap();
    assert!(report.outcomes[&Shard::new("default")]
        .error
        .as_ref()
        .is_some_and(Error::is_cycle));
    assert!(catalog.executed().is_empty());
}

#[tokio::test]
async fn test_invalid_declarations_fail_before_touching_shards() {
    let catalog = Arc::new(MemoryCatalog::new());
    let declared = Schema::new().with_table(
        Table::new("order")
            .with_column(Column::new("customer_id", ColumnKind::integer()))
            .with_constraint(Constraint::foreign_key(
                "order_customer_fk",
                &["customer_id"],
                "customer",
                &["id"],
            )),
    );
    let reconciler = Reconciler::new(Sharding::single(catalog.clone()), declared);

    let err = reconciler.reconcile().await.unwrap_err();
    assert!(matches!(err, Error::Declaration(_)), "{}", err);
    assert_eq!(catalog.read_count(), 0);
}
