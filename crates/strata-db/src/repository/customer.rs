//! Customer repository.
//!
//! `balance_cents` is the amount the customer owes on credit. It only moves
//! through [`CustomerRepository::apply_balance_delta`], inside the same
//! transaction as the sale or void that changes it.

use sqlx::{SqliteConnection, SqlitePool};
use strata_core::validation::{validate_name, validate_non_negative_cents};
use strata_core::Customer;

use crate::error::{DbError, DbResult};
use crate::repository::{new_id, now};

pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    pub async fn create(
        &self,
        name: &str,
        phone: Option<&str>,
        credit_limit_cents: i64,
    ) -> DbResult<Customer> {
        validate_name(name)?;
        validate_non_negative_cents("credit_limit", credit_limit_cents)?;

        let customer = Customer {
            id: new_id(),
            name: name.trim().to_string(),
            phone: phone.map(String::from),
            email: None,
            tax_id: None,
            credit_limit_cents,
            balance_cents: 0,
            notes: None,
            is_active: true,
            created_at: now(),
            updated_at: now(),
            sync_version: 0,
        };

        sqlx::query(
            "INSERT INTO customers
                (id, name, phone, email, tax_id, credit_limit_cents, balance_cents,
                 notes, is_active, created_at, updated_at, sync_version)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(&customer.email)
        .bind(&customer.tax_id)
        .bind(customer.credit_limit_cents)
        .bind(customer.balance_cents)
        .bind(&customer.notes)
        .bind(customer.is_active)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .bind(customer.sync_version)
        .execute(&self.pool)
        .await?;

        Ok(customer)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(customer)
    }

    /// Transaction-scoped load, for credit checks during posting.
    pub async fn get_tx(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = ?")
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(customer)
    }

    pub async fn require_tx(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<Customer> {
        self.get_tx(conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", id))
    }

    pub async fn list_active(&self) -> DbResult<Vec<Customer>> {
        let customers = sqlx::query_as::<_, Customer>(
            "SELECT * FROM customers WHERE is_active = 1 ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(customers)
    }

    /// Moves the credit balance by `delta_cents` (positive on credit sale,
    /// negative on void or payment received).
    pub async fn apply_balance_delta(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        delta_cents: i64,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE customers
             SET balance_cents = balance_cents + ?, updated_at = ?, sync_version = sync_version + 1
             WHERE id = ?",
        )
        .bind(delta_cents)
        .bind(now())
        .bind(id)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", id));
        }
        Ok(())
    }

    pub async fn set_credit_limit(&self, id: &str, limit_cents: i64) -> DbResult<()> {
        validate_non_negative_cents("credit_limit", limit_cents)?;
        let result = sqlx::query(
            "UPDATE customers
             SET credit_limit_cents = ?, updated_at = ?, sync_version = sync_version + 1
             WHERE id = ?",
        )
        .bind(limit_cents)
        .bind(now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", id));
        }
        Ok(())
    }
}
