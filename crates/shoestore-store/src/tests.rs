//! Query builder, seeding and join tests for the mock store.

#![allow(clippy::unwrap_used)]

use serde_json::{Value, json};

use crate::fixtures::Fixtures;
use crate::query::{MockDatabase, QueryData};
use crate::table::TableStore;
use crate::{Row, StoreError};

async fn empty_db() -> MockDatabase {
    MockDatabase::new(TableStore::in_memory(Fixtures::empty()).await.unwrap())
}

async fn shop_db() -> MockDatabase {
    MockDatabase::new(TableStore::in_memory(Fixtures::shoe_store()).await.unwrap())
}

fn row(value: Value) -> Row {
    match value {
        Value::Object(row) => row,
        other => panic!("not an object: {other}"),
    }
}

fn column(rows: &[Row], name: &str) -> Vec<Value> {
    rows.iter().map(|r| r[name].clone()).collect()
}

// === Reads ===

#[tokio::test]
async fn filter_then_order_descending() {
    let db = empty_db().await;
    db.from("t")
        .insert(json!([{"a": 1, "b": "x"}, {"a": 2, "b": "y"}, {"a": 3, "b": "x"}]))
        .await
        .unwrap();

    let rows = db
        .from("t")
        .eq("b", "x")
        .order("a", false)
        .await
        .unwrap()
        .into_rows();

    assert_eq!(column(&rows, "a"), vec![json!(3), json!(1)]);
    assert!(rows.iter().all(|r| r["b"] == "x"));
}

#[tokio::test]
async fn filters_declared_in_any_order_compose() {
    let db = empty_db().await;
    db.from("t")
        .insert(json!([{"n": 1}, {"n": 5}, {"n": 9}, {"n": 12}]))
        .await
        .unwrap();

    let a = db.from("t").order("n", true).gte("n", 5).lt("n", 12).await.unwrap();
    let b = db.from("t").lt("n", 12).order("n", true).gte("n", 5).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(column(&a.into_rows(), "n"), vec![json!(5), json!(9)]);
}

#[tokio::test]
async fn comparison_operators_and_neq() {
    let db = empty_db().await;
    db.from("t")
        .insert(json!([{"n": 1}, {"n": 2}, {"n": 3}, {"m": 0}]))
        .await
        .unwrap();

    let count = |data: QueryData| data.len();
    assert_eq!(count(db.from("t").gt("n", 1).await.unwrap()), 2);
    assert_eq!(count(db.from("t").lte("n", 2).await.unwrap()), 2);
    // Missing columns never satisfy ordering comparisons but do satisfy neq.
    assert_eq!(count(db.from("t").neq("n", 2).await.unwrap()), 3);
    assert_eq!(count(db.from("t").is_null("n").await.unwrap()), 1);
    assert_eq!(count(db.from("t").in_list("n", [1, 3]).await.unwrap()), 2);
}

#[tokio::test]
async fn ilike_matches_case_insensitively_anywhere() {
    let db = shop_db().await;
    let rows = db
        .from("products")
        .ilike("name", "%runner%")
        .await
        .unwrap()
        .into_rows();
    assert_eq!(column(&rows, "id"), vec![json!("prod-001")]);

    let none = db.from("products").ilike("name", "%sandalia%").await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn limit_and_range_truncate_after_sorting() {
    let db = empty_db().await;
    db.from("t")
        .insert(json!([{"n": 4}, {"n": 1}, {"n": 3}, {"n": 2}]))
        .await
        .unwrap();

    let top = db.from("t").order("n", false).limit(2).await.unwrap().into_rows();
    assert_eq!(column(&top, "n"), vec![json!(4), json!(3)]);

    let page = db.from("t").order("n", true).range(1, 2).await.unwrap().into_rows();
    assert_eq!(column(&page, "n"), vec![json!(2), json!(3)]);
}

#[tokio::test]
async fn order_puts_nulls_last_and_is_stable() {
    let db = empty_db().await;
    db.from("t")
        .insert(json!([
            {"k": "first", "n": 2},
            {"k": "nil"},
            {"k": "second", "n": 2},
            {"k": "low", "n": 1}
        ]))
        .await
        .unwrap();

    let rows = db.from("t").order("n", true).await.unwrap().into_rows();
    assert_eq!(
        column(&rows, "k"),
        vec![json!("low"), json!("first"), json!("second"), json!("nil")]
    );
}

#[tokio::test]
async fn single_with_no_match_is_not_found() {
    let db = empty_db().await;
    let result = db.from("t").eq("id", "missing").single().await;
    let err = result.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.code(), "PGRST116");
}

#[tokio::test]
async fn single_and_maybe_single_cardinality() {
    let db = empty_db().await;
    db.from("t").insert(json!([{"g": 1}, {"g": 1}])).await.unwrap();

    let err = db.from("t").eq("g", 1).single().await.unwrap_err();
    assert!(matches!(err, StoreError::MultipleRows { count: 2, .. }));

    let empty = db.from("t").eq("g", 2).maybe_single().await.unwrap();
    assert_eq!(empty, QueryData::Empty);

    let one = db.from("t").eq("g", 1).limit(1).single().await.unwrap();
    assert!(matches!(one, QueryData::Row(_)));
}

#[tokio::test]
async fn invalid_select_surfaces_as_error() {
    let db = empty_db().await;
    let err = db.from("t").select("products(*").await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidSelect(_)));
}

#[tokio::test]
async fn column_projection_and_rename() {
    let db = shop_db().await;
    let row = db
        .from("products")
        .select("id, title:name")
        .eq("id", "prod-002")
        .single()
        .await
        .unwrap()
        .into_row()
        .unwrap();
    assert_eq!(row.len(), 2);
    assert_eq!(row["title"], "Mocasín Clásico");
}

// === Seeding and storage ===

#[tokio::test]
async fn first_read_seeds_from_fixtures() {
    let db = shop_db().await;
    assert!(db.tables().tables().await.unwrap().is_empty());

    let products = db.from("products").await.unwrap();
    assert_eq!(products.len(), 2);
    assert_eq!(db.tables().tables().await.unwrap(), vec!["products"]);

    let sales = db.from("sales").await.unwrap();
    assert!(sales.is_empty());
}

#[tokio::test]
async fn seed_applies_only_once() {
    let db = shop_db().await;
    db.from("products").delete().await.unwrap();
    assert!(db.from("products").await.unwrap().is_empty());
}

#[tokio::test]
async fn reset_reseeds_table() {
    let db = shop_db().await;
    db.from("products").delete().await.unwrap();
    assert!(db.tables().reset("products").await.unwrap());
    assert_eq!(db.from("products").await.unwrap().len(), 2);
}

#[tokio::test]
async fn legacy_profiles_get_a_display_name() {
    let db = shop_db().await;
    let admin = db
        .from("profiles")
        .eq("id", "user-admin-001")
        .single()
        .await
        .unwrap()
        .into_row()
        .unwrap();
    assert_eq!(admin["full_name"], "Admin");

    // The repair was written back.
    let stored: Vec<Row> = db
        .tables()
        .database()
        .get_json("mock_db_profiles")
        .await
        .unwrap()
        .unwrap();
    assert!(stored.iter().all(|p| p.contains_key("full_name")));
}

#[tokio::test]
async fn legacy_profiles_persisted_earlier_are_repaired_on_read() {
    let tables = TableStore::in_memory(Fixtures::empty()).await.unwrap();
    tables
        .write("profiles", &[row(json!({"id": "u1", "email": "caja.central@x.com"}))])
        .await
        .unwrap();

    let profiles = tables.read("profiles").await.unwrap();
    assert_eq!(profiles[0]["full_name"], "Caja Central");
}

#[tokio::test]
async fn reads_return_fresh_copies() {
    let db = shop_db().await;
    let mut first = db.tables().read("products").await.unwrap();
    first[0].insert("name".into(), json!("mutated"));

    let second = db.tables().read("products").await.unwrap();
    assert_ne!(second[0]["name"], "mutated");
}

// === Mutations ===

#[tokio::test]
async fn insert_assigns_ids_and_timestamps() {
    let db = empty_db().await;
    let inserted = db
        .from("sales")
        .insert(json!({"total": 150.5}))
        .await
        .unwrap();
    let QueryData::Row(sale) = inserted else {
        panic!("scalar insert should return one row");
    };
    assert!(sale["id"].as_str().is_some_and(|id| !id.is_empty()));
    assert!(sale.contains_key("created_at"));
    assert_eq!(sale["created_at"], sale["updated_at"]);

    let batch = db
        .from("sales")
        .insert(json!([{"total": 1}, {"id": "keep-me", "total": 2}]))
        .await
        .unwrap()
        .into_rows();
    assert_eq!(batch.len(), 2);
    assert_ne!(batch[0]["id"], sale["id"]);
    assert_eq!(batch[1]["id"], "keep-me");

    let one = db
        .from("sales")
        .insert_one(row(json!({"total": 3, "note": null})))
        .await
        .unwrap();
    assert!(matches!(one, QueryData::Row(r) if r["total"] == 3));
    assert_eq!(db.from("sales").await.unwrap().len(), 4);
}

#[tokio::test]
async fn insert_rejects_non_objects() {
    let db = empty_db().await;
    let err = db.from("t").insert(json!([1, 2])).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidRow(_)));
    assert!(db.from("t").await.unwrap().is_empty());
}

#[tokio::test]
async fn update_touches_only_matching_rows() {
    let db = empty_db().await;
    let old = "2020-01-01T00:00:00.000Z";
    db.from("t")
        .insert(json!([
            {"id": "R1", "qty": 1, "created_at": old, "updated_at": old},
            {"id": "R2", "qty": 2, "created_at": old, "updated_at": old},
            {"id": "R3", "qty": 3, "created_at": old, "updated_at": old}
        ]))
        .await
        .unwrap();
    let before = db.tables().read("t").await.unwrap();

    let snapshot = db
        .from("t")
        .update(json!({"qty": 10}))
        .eq("id", "R1")
        .await
        .unwrap()
        .into_rows();
    // Plural update returns the whole table.
    assert_eq!(snapshot.len(), 3);

    let after = db.tables().read("t").await.unwrap();
    assert_eq!(after[0]["qty"], 10);
    assert_ne!(after[0]["updated_at"], old);
    assert_eq!(after[1], before[1]);
    assert_eq!(after[2], before[2]);
}

#[tokio::test]
async fn single_update_returns_the_updated_row() {
    let db = shop_db().await;
    let variant = db
        .from("product_variants")
        .update(json!({"stock": 0}))
        .eq("sku", "RUN-42-BLA")
        .single()
        .await
        .unwrap()
        .into_row()
        .unwrap();
    assert_eq!(variant["id"], "var-002");
    assert_eq!(variant["stock"], 0);

    let missing = db
        .from("product_variants")
        .update(json!({"stock": 0}))
        .eq("sku", "nope")
        .single()
        .await;
    assert!(missing.unwrap_err().is_not_found());
}

#[tokio::test]
async fn delete_removes_only_matching_rows() {
    let db = shop_db().await;
    let removed = db
        .from("product_variants")
        .delete()
        .eq("product_id", "prod-001")
        .await
        .unwrap()
        .into_rows();
    assert_eq!(removed.len(), 2);

    let left = db.from("product_variants").await.unwrap().into_rows();
    assert_eq!(column(&left, "id"), vec![json!("var-003")]);
}

#[tokio::test]
async fn upsert_updates_by_conflict_column_or_inserts() {
    let db = shop_db().await;
    let updated = db
        .from("profiles")
        .upsert(
            json!({"id": "ignored", "email": "ventas@zapateria.com", "role": "admin"}),
            "email",
        )
        .await
        .unwrap()
        .into_row()
        .unwrap();
    assert_eq!(updated["id"], "user-vendedor-001");
    assert_eq!(updated["role"], "admin");

    let inserted = db
        .from("profiles")
        .upsert(json!({"email": "nuevo@zapateria.com", "role": "vendedor"}), "email")
        .await
        .unwrap()
        .into_row()
        .unwrap();
    assert!(inserted.contains_key("id"));
    assert_eq!(db.from("profiles").await.unwrap().len(), 3);
}

#[tokio::test]
async fn concurrent_inserts_are_not_lost() {
    let db = empty_db().await;
    let mut handles = Vec::new();
    for n in 0..16 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            db.from("t").insert(json!({"n": n})).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(db.from("t").await.unwrap().len(), 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn seeding_reads_do_not_clobber_concurrent_inserts() {
    let db = shop_db().await;
    for round in 0..20 {
        db.tables().reset("profiles").await.unwrap();
        let mut handles = Vec::new();
        for n in 0..4 {
            let reader = db.clone();
            handles.push(tokio::spawn(async move {
                reader.from("profiles").await.unwrap();
            }));
            let writer = db.clone();
            handles.push(tokio::spawn(async move {
                writer
                    .from("profiles")
                    .insert(json!({"email": format!("caja{round}-{n}@x.com"), "role": "vendedor"}))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        // Two seeded profiles plus every insert.
        let profiles = db.from("profiles").await.unwrap().into_rows();
        assert_eq!(profiles.len(), 6, "round {round}");
        assert!(profiles.iter().all(|p| p["full_name"].is_string()));
    }
}

// === Joins ===

#[tokio::test]
async fn one_to_many_attaches_matching_variants() {
    let db = empty_db().await;
    db.from("products")
        .insert(json!([{"id": "P1", "name": "Bota"}, {"id": "P2", "name": "Sandalia"}]))
        .await
        .unwrap();
    db.from("product_variants")
        .insert(json!([
            {"id": "V1", "product_id": "P1", "size": "38"},
            {"id": "V2", "product_id": "P1", "size": "39"},
            {"id": "V3", "product_id": "P9", "size": "40"}
        ]))
        .await
        .unwrap();

    let products = db
        .from("products")
        .select("*, variants:product_variants(*)")
        .order("id", true)
        .await
        .unwrap()
        .into_rows();

    let p1 = products[0]["variants"].as_array().unwrap();
    let ids: Vec<&str> = p1.iter().map(|v| v["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["V1", "V2"]);
    assert_eq!(products[1]["variants"], json!([]));
}

#[tokio::test]
async fn to_one_attaches_parent_or_null() {
    let db = shop_db().await;
    db.from("product_variants")
        .insert(json!({"id": "orphan", "product_id": "gone"}))
        .await
        .unwrap();

    let variants = db
        .from("product_variants")
        .select("id, product:products(name)")
        .order("id", true)
        .await
        .unwrap()
        .into_rows();

    let orphan = variants.iter().find(|v| v["id"] == "orphan").unwrap();
    assert_eq!(orphan["product"], Value::Null);

    let var1 = variants.iter().find(|v| v["id"] == "var-001").unwrap();
    assert_eq!(var1["product"], json!({"name": "Zapatilla Runner Pro"}));
    assert!(!var1.contains_key("product_id"));
}

#[tokio::test]
async fn rows_missing_the_key_get_null_not_an_array() {
    let db = shop_db().await;
    db.from("product_variants")
        .insert(json!({"id": "loose", "sku": "SIN-PROD"}))
        .await
        .unwrap();

    let variants = db
        .from("product_variants")
        .select("id, product:products(name)")
        .await
        .unwrap()
        .into_rows();

    assert!(variants.iter().all(|v| v["product"].is_object() || v["product"].is_null()));
    let loose = variants.iter().find(|v| v["id"] == "loose").unwrap();
    assert_eq!(loose["product"], Value::Null);
}

#[tokio::test]
async fn two_level_nesting_through_purchase_items() {
    let db = shop_db().await;
    db.from("purchases")
        .insert(json!({"id": "pur-1", "supplier_id": "sup-002", "total": 300}))
        .await
        .unwrap();
    db.from("purchase_items")
        .insert(json!([
            {"id": "pi-1", "purchase_id": "pur-1", "variant_id": "var-001", "quantity": 6},
            {"id": "pi-2", "purchase_id": "pur-1", "variant_id": "var-002", "quantity": 4},
            {"id": "pi-3", "purchase_id": "pur-other", "variant_id": "var-003", "quantity": 1}
        ]))
        .await
        .unwrap();

    let purchase = db
        .from("purchases")
        .select(
            "*, supplier:suppliers(name), purchase_items(*, variant:product_variants(*, product:products(*)))",
        )
        .eq("id", "pur-1")
        .single()
        .await
        .unwrap()
        .into_row()
        .unwrap();

    assert_eq!(purchase["supplier"]["name"], "Deportivos Andinos");
    let items = purchase["purchase_items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    for item in items {
        assert_eq!(item["variant"]["product"]["id"], "prod-001");
    }
}

#[tokio::test]
async fn join_does_not_modify_stored_rows() {
    let db = shop_db().await;
    db.from("products")
        .select("*, variants:product_variants(*)")
        .await
        .unwrap();
    let stored = db.tables().read("products").await.unwrap();
    assert!(stored.iter().all(|p| !p.contains_key("variants")));
}
