//! Seeds a development database with two stores, a supplier, customers,
//! stock, and one full trading flow (purchase received, sale posted,
//! session closed) so every screen has data behind it.
//!
//! ```sh
//! STRATA_DB_PATH=strata-dev.db cargo run -p strata-db --bin seed
//! ```

use strata_core::PaymentMethod;
use strata_db::repository::{NewPurchaseLine, NewTransferLine};
use strata_db::{Database, DbConfig, DbResult};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> DbResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = std::env::var("STRATA_DB_PATH").unwrap_or_else(|_| "strata-dev.db".to_string());
    let db = Database::new(DbConfig::new(&path)).await?;
    db.run_migrations().await?;

    let downtown = db.stores().create("DT-01", "Downtown", Some("1 Main St")).await?;
    let mall = db.stores().create("MA-02", "Riverside Mall", None).await?;
    info!(downtown = %downtown.code, mall = %mall.code, "stores created");

    let supplier = db
        .suppliers()
        .create("Acme Wholesale", Some("Jo Chen"), Some("+1-555-0100"), None)
        .await?;

    let ada = db.customers().create("Ada Lovelace", Some("+1-555-0199"), 100_000).await?;
    db.loyalty().create_account(&ada.id, 100).await?;
    db.customers().create("Grace Hopper", None, 0).await?;

    db.stock()
        .create_item(&downtown.id, "IPH15-128-BLK", "iPhone 15 128GB Black", 89_900, 825)
        .await?;
    db.stock()
        .create_item(&downtown.id, "CASE-CLR", "Clear Case", 1_999, 825)
        .await?;
    db.stock().set_reorder_level(&downtown.id, "CASE-CLR", 5).await?;

    // A received purchase puts real cost layers behind the stock.
    let purchase = db
        .purchases()
        .create(
            &downtown.id,
            &supplier.id,
            "seed",
            vec![
                NewPurchaseLine {
                    sku: "IPH15-128-BLK".into(),
                    name: "iPhone 15 128GB Black".into(),
                    quantity: 2,
                    unit_cost_cents: 60_000,
                    imeis: vec!["490154203237518".into(), "352099001761481".into()],
                },
                NewPurchaseLine {
                    sku: "CASE-CLR".into(),
                    name: "Clear Case".into(),
                    quantity: 20,
                    unit_cost_cents: 500,
                    imeis: vec![],
                },
            ],
        )
        .await?;
    db.purchasing().receive_purchase(&purchase.id, "seed").await?;

    // One shift with a cash sale in it.
    let session = db
        .register_service()
        .open_session(&downtown.id, "reg-1", "seed", 10_000)
        .await?;

    let sale = db
        .sales()
        .create_draft(&downtown.id, &downtown.code, Some(&ada.id), Some(&session.id), false, "seed")
        .await?;
    db.sales()
        .add_item(&sale.id, "CASE-CLR", None, "Clear Case", 1_999, 2, 0, 0)
        .await?;
    db.sales()
        .add_payment(&sale.id, PaymentMethod::Cash, 3_998, Some(5_000), None)
        .await?;
    db.sales_service().post_sale(&sale.id, "seed").await?;

    db.register_service().close_session(&session.id, 13_998, "seed").await?;

    // A pending transfer towards the mall store.
    db.transfers()
        .create(
            &downtown.id,
            &mall.id,
            "seed",
            vec![NewTransferLine {
                sku: "CASE-CLR".into(),
                quantity: 5,
                device_id: None,
            }],
        )
        .await?;

    let pending = db.outbox().pending_count().await?;
    info!(path, outbox_pending = pending, "seed complete");
    Ok(())
}
