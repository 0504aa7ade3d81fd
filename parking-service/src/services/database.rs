//! Database service for parking-service.
//!
//! Pool-level reads are instance methods. Operations that must run inside a
//! caller-owned transaction (row locks, inserts that combine into one atomic
//! settlement) are associated functions taking a `PgConnection`.

use crate::models::{
    CashAdjustment, CreateDebt, CreatePayment, CreateSession, Debt, DebtStatus, ListDebtsFilter,
    OpenShift, OperationKind, ParkingSession, Payment, PricingRule, SessionDiscount, SessionStatus,
    Shift, ShiftOperation, ShiftStatus,
};
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use service_core::error::{codes, AppError};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

fn persistence(context: &str, err: sqlx::Error) -> AppError {
    AppError::Persistence(anyhow::anyhow!("{}: {}", context, err))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "parking-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| persistence("Failed to connect", e))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| persistence("Health check failed", e))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Persistence(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Create a new ACTIVE parking session.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, plate = %input.plate))]
    pub async fn create_session(&self, input: &CreateSession) -> Result<ParkingSession, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_session"])
            .start_timer();

        let session = sqlx::query_as::<_, ParkingSession>(
            r#"
            INSERT INTO parking_sessions (session_id, tenant_id, plate, sector_id, street_id, entry_operator_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING session_id, tenant_id, plate, sector_id, street_id, entry_operator_id, status, started_at, ended_at, settled_amount, created_utc, updated_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.tenant_id)
        .bind(&input.plate)
        .bind(input.sector_id)
        .bind(input.street_id)
        .bind(input.entry_operator_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| persistence("Failed to create session", e))?;

        timer.observe_duration();
        info!(session_id = %session.session_id, "Session created");

        Ok(session)
    }

    /// Get a session by id.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, session_id = %session_id))]
    pub async fn get_session(
        &self,
        tenant_id: Uuid,
        session_id: Uuid,
    ) -> Result<Option<ParkingSession>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_session"])
            .start_timer();

        let session = sqlx::query_as::<_, ParkingSession>(
            r#"
            SELECT session_id, tenant_id, plate, sector_id, street_id, entry_operator_id, status, started_at, ended_at, settled_amount, created_utc, updated_utc
            FROM parking_sessions
            WHERE tenant_id = $1 AND session_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| persistence("Failed to get session", e))?;

        timer.observe_duration();

        Ok(session)
    }

    /// Get a session by id alone. Used by the payment webhook, which carries
    /// no tenant header; the session row supplies the tenant scope.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn get_session_untenanted(
        &self,
        session_id: Uuid,
    ) -> Result<Option<ParkingSession>, AppError> {
        let session = sqlx::query_as::<_, ParkingSession>(
            r#"
            SELECT session_id, tenant_id, plate, sector_id, street_id, entry_operator_id, status, started_at, ended_at, settled_amount, created_utc, updated_utc
            FROM parking_sessions
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| persistence("Failed to get session", e))?;

        Ok(session)
    }

    /// Payments recorded against a session.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn payments_for_session(
        &self,
        tenant_id: Uuid,
        session_id: Uuid,
    ) -> Result<Vec<Payment>, AppError> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT payment_id, tenant_id, session_id, debt_id, shift_id, amount, method, status, provider_txn_id, provider_ref, created_utc
            FROM payments
            WHERE tenant_id = $1 AND session_id = $2
            ORDER BY created_utc
            "#,
        )
        .bind(tenant_id)
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| persistence("Failed to list payments", e))?;

        Ok(payments)
    }

    // =========================================================================
    // Tariff configuration (read-only here; administered elsewhere)
    // =========================================================================

    /// Active rules of the sector's active profiles whose profile window
    /// contains the reference instant.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, sector_id = %sector_id))]
    pub async fn active_rules_for_sector(
        &self,
        tenant_id: Uuid,
        sector_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Vec<PricingRule>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["active_rules_for_sector"])
            .start_timer();

        let rules = sqlx::query_as::<_, PricingRule>(
            r#"
            SELECT r.rule_id, r.profile_id, r.rule_type, r.min_duration_minutes, r.max_duration_minutes,
                   r.daily_max_amount, r.min_amount, r.min_amount_is_base, r.price_per_min, r.fixed_price,
                   r.days_of_week, r.start_time, r.end_time, r.priority, r.is_active, r.created_utc, r.updated_utc
            FROM pricing_rules r
            JOIN pricing_profiles p ON p.profile_id = r.profile_id
            WHERE p.tenant_id = $1
              AND p.sector_id = $2
              AND p.is_active
              AND r.is_active
              AND (p.active_from IS NULL OR p.active_from <= $3)
              AND (p.active_to IS NULL OR p.active_to >= $3)
            ORDER BY r.priority, r.rule_id
            "#,
        )
        .bind(tenant_id)
        .bind(sector_id)
        .bind(at)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| persistence("Failed to load pricing rules", e))?;

        timer.observe_duration();

        Ok(rules)
    }

    /// Active discounts whose validity window contains the reference instant.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn applicable_discounts(
        &self,
        tenant_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Vec<SessionDiscount>, AppError> {
        let discounts = sqlx::query_as::<_, SessionDiscount>(
            r#"
            SELECT discount_id, tenant_id, code, discount_type, value, minute_value, max_amount, min_amount,
                   priority, valid_from, valid_until, is_active, created_utc, updated_utc
            FROM session_discounts
            WHERE tenant_id = $1
              AND is_active
              AND (valid_from IS NULL OR valid_from <= $2)
              AND (valid_until IS NULL OR valid_until >= $2)
            ORDER BY priority, discount_id
            "#,
        )
        .bind(tenant_id)
        .bind(at)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| persistence("Failed to load discounts", e))?;

        Ok(discounts)
    }

    // =========================================================================
    // Debts
    // =========================================================================

    /// Get a debt by id.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, debt_id = %debt_id))]
    pub async fn get_debt(&self, tenant_id: Uuid, debt_id: Uuid) -> Result<Option<Debt>, AppError> {
        let debt = sqlx::query_as::<_, Debt>(
            r#"
            SELECT debt_id, tenant_id, plate, principal_amount, origin, status, session_id, notes,
                   settled_amount, settled_at, settled_by, created_utc, updated_utc
            FROM debts
            WHERE tenant_id = $1 AND debt_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(debt_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| persistence("Failed to get debt", e))?;

        Ok(debt)
    }

    /// List debts, optionally filtered by plate and status.
    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id))]
    pub async fn list_debts(
        &self,
        tenant_id: Uuid,
        filter: &ListDebtsFilter,
    ) -> Result<Vec<Debt>, AppError> {
        let debts = sqlx::query_as::<_, Debt>(
            r#"
            SELECT debt_id, tenant_id, plate, principal_amount, origin, status, session_id, notes,
                   settled_amount, settled_at, settled_by, created_utc, updated_utc
            FROM debts
            WHERE tenant_id = $1
              AND ($2::TEXT IS NULL OR plate = $2)
              AND ($3::TEXT IS NULL OR status = $3)
            ORDER BY created_utc DESC
            "#,
        )
        .bind(tenant_id)
        .bind(filter.plate.as_deref())
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| persistence("Failed to list debts", e))?;

        Ok(debts)
    }

    /// Create a debt outside the session flow (MANUAL or FINE origin).
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, plate = %input.plate))]
    pub async fn create_debt(&self, input: &CreateDebt) -> Result<Debt, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_debt"])
            .start_timer();

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| persistence("Failed to acquire connection", e))?;
        let debt = Self::insert_debt(&mut *conn, input).await?;

        timer.observe_duration();
        info!(debt_id = %debt.debt_id, origin = %debt.origin, "Debt created");

        Ok(debt)
    }

    // =========================================================================
    // Shifts
    // =========================================================================

    /// Open a shift with an opening float. The partial unique index on open
    /// shifts is the concurrency guard; a violation maps to a typed conflict.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, operator_id = %input.operator_id))]
    pub async fn open_shift(&self, input: &OpenShift) -> Result<Shift, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["open_shift"])
            .start_timer();

        let result = sqlx::query_as::<_, Shift>(
            r#"
            INSERT INTO shifts (shift_id, tenant_id, operator_id, sector_id, device_id, opening_float)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING shift_id, tenant_id, operator_id, sector_id, device_id, status, opening_float, opened_at,
                      closed_at, closing_declared_cash, expected_cash, cash_over_short, closed_by, notes,
                      created_utc, updated_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.tenant_id)
        .bind(input.operator_id)
        .bind(input.sector_id)
        .bind(&input.device_id)
        .bind(input.opening_float)
        .fetch_one(&self.pool)
        .await;

        timer.observe_duration();

        match result {
            Ok(shift) => {
                info!(shift_id = %shift.shift_id, "Shift opened");
                Ok(shift)
            }
            Err(e) if is_unique_violation(&e) => Err(AppError::conflict(
                codes::SHIFT_ALREADY_OPEN,
                format!(
                    "Operator {} already has an open shift on this device",
                    input.operator_id
                ),
            )),
            Err(e) => Err(persistence("Failed to open shift", e)),
        }
    }

    /// Get a shift by id.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, shift_id = %shift_id))]
    pub async fn get_shift(
        &self,
        tenant_id: Uuid,
        shift_id: Uuid,
    ) -> Result<Option<Shift>, AppError> {
        let shift = sqlx::query_as::<_, Shift>(
            r#"
            SELECT shift_id, tenant_id, operator_id, sector_id, device_id, status, opening_float, opened_at,
                   closed_at, closing_declared_cash, expected_cash, cash_over_short, closed_by, notes,
                   created_utc, updated_utc
            FROM shifts
            WHERE tenant_id = $1 AND shift_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(shift_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| persistence("Failed to get shift", e))?;

        Ok(shift)
    }

    /// The operator's current OPEN shift, optionally narrowed to one device.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, operator_id = %operator_id))]
    pub async fn current_shift(
        &self,
        tenant_id: Uuid,
        operator_id: Uuid,
        device_id: Option<&str>,
    ) -> Result<Option<Shift>, AppError> {
        let shift = sqlx::query_as::<_, Shift>(
            r#"
            SELECT shift_id, tenant_id, operator_id, sector_id, device_id, status, opening_float, opened_at,
                   closed_at, closing_declared_cash, expected_cash, cash_over_short, closed_by, notes,
                   created_utc, updated_utc
            FROM shifts
            WHERE tenant_id = $1
              AND operator_id = $2
              AND status = 'open'
              AND ($3::TEXT IS NULL OR device_id IS NOT DISTINCT FROM $3)
            ORDER BY opened_at DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(operator_id)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| persistence("Failed to get current shift", e))?;

        Ok(shift)
    }

    /// Manual cash adjustments recorded on a shift.
    #[instrument(skip(self), fields(shift_id = %shift_id))]
    pub async fn adjustments_for_shift(
        &self,
        tenant_id: Uuid,
        shift_id: Uuid,
    ) -> Result<Vec<CashAdjustment>, AppError> {
        let adjustments = sqlx::query_as::<_, CashAdjustment>(
            r#"
            SELECT adjustment_id, tenant_id, shift_id, kind, amount, reason, created_by, created_utc
            FROM cash_adjustments
            WHERE tenant_id = $1 AND shift_id = $2
            ORDER BY created_utc
            "#,
        )
        .bind(tenant_id)
        .bind(shift_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| persistence("Failed to list adjustments", e))?;

        Ok(adjustments)
    }

    /// Payments collected into a shift's drawer.
    #[instrument(skip(self), fields(shift_id = %shift_id))]
    pub async fn payments_for_shift(
        &self,
        tenant_id: Uuid,
        shift_id: Uuid,
    ) -> Result<Vec<Payment>, AppError> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT payment_id, tenant_id, session_id, debt_id, shift_id, amount, method, status, provider_txn_id, provider_ref, created_utc
            FROM payments
            WHERE tenant_id = $1 AND shift_id = $2
            ORDER BY created_utc
            "#,
        )
        .bind(tenant_id)
        .bind(shift_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| persistence("Failed to list shift payments", e))?;

        Ok(payments)
    }

    // =========================================================================
    // Transaction-scoped operations
    // =========================================================================

    /// Load a session with a row lock, serializing concurrent settlements.
    pub async fn session_for_update(
        conn: &mut PgConnection,
        tenant_id: Uuid,
        session_id: Uuid,
    ) -> Result<Option<ParkingSession>, AppError> {
        let session = sqlx::query_as::<_, ParkingSession>(
            r#"
            SELECT session_id, tenant_id, plate, sector_id, street_id, entry_operator_id, status, started_at, ended_at, settled_amount, created_utc, updated_utc
            FROM parking_sessions
            WHERE tenant_id = $1 AND session_id = $2
            FOR UPDATE
            "#,
        )
        .bind(tenant_id)
        .bind(session_id)
        .fetch_optional(conn)
        .await
        .map_err(|e| persistence("Failed to lock session", e))?;

        Ok(session)
    }

    /// Transition a locked session to a terminal state, setting `ended_at`
    /// exactly once.
    pub async fn finish_session(
        conn: &mut PgConnection,
        session_id: Uuid,
        status: SessionStatus,
        ended_at: DateTime<Utc>,
        settled_amount: Option<Decimal>,
    ) -> Result<ParkingSession, AppError> {
        let session = sqlx::query_as::<_, ParkingSession>(
            r#"
            UPDATE parking_sessions
            SET status = $2, ended_at = $3, settled_amount = $4, updated_utc = now()
            WHERE session_id = $1 AND status = 'active'
            RETURNING session_id, tenant_id, plate, sector_id, street_id, entry_operator_id, status, started_at, ended_at, settled_amount, created_utc, updated_utc
            "#,
        )
        .bind(session_id)
        .bind(status.as_str())
        .bind(ended_at)
        .bind(settled_amount)
        .fetch_optional(conn)
        .await
        .map_err(|e| persistence("Failed to finish session", e))?;

        session.ok_or_else(|| {
            AppError::conflict(
                codes::SESSION_NOT_ACTIVE,
                format!("Session {} is not active", session_id),
            )
        })
    }

    /// Record a payment.
    pub async fn insert_payment(
        conn: &mut PgConnection,
        input: &CreatePayment,
    ) -> Result<Payment, AppError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (payment_id, tenant_id, session_id, debt_id, shift_id, amount, method, status, provider_txn_id, provider_ref)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING payment_id, tenant_id, session_id, debt_id, shift_id, amount, method, status, provider_txn_id, provider_ref, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.tenant_id)
        .bind(input.session_id)
        .bind(input.debt_id)
        .bind(input.shift_id)
        .bind(input.amount)
        .bind(input.method.as_str())
        .bind(input.status.as_str())
        .bind(&input.provider_txn_id)
        .bind(&input.provider_ref)
        .fetch_one(conn)
        .await
        .map_err(|e| persistence("Failed to record payment", e))?;

        Ok(payment)
    }

    /// Record a PENDING debt.
    pub async fn insert_debt(conn: &mut PgConnection, input: &CreateDebt) -> Result<Debt, AppError> {
        let debt = sqlx::query_as::<_, Debt>(
            r#"
            INSERT INTO debts (debt_id, tenant_id, plate, principal_amount, origin, session_id, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING debt_id, tenant_id, plate, principal_amount, origin, status, session_id, notes,
                      settled_amount, settled_at, settled_by, created_utc, updated_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.tenant_id)
        .bind(&input.plate)
        .bind(input.principal_amount)
        .bind(input.origin.as_str())
        .bind(input.session_id)
        .bind(&input.notes)
        .fetch_one(conn)
        .await
        .map_err(|e| persistence("Failed to create debt", e))?;

        Ok(debt)
    }

    /// Load a debt with a row lock.
    pub async fn debt_for_update(
        conn: &mut PgConnection,
        tenant_id: Uuid,
        debt_id: Uuid,
    ) -> Result<Option<Debt>, AppError> {
        let debt = sqlx::query_as::<_, Debt>(
            r#"
            SELECT debt_id, tenant_id, plate, principal_amount, origin, status, session_id, notes,
                   settled_amount, settled_at, settled_by, created_utc, updated_utc
            FROM debts
            WHERE tenant_id = $1 AND debt_id = $2
            FOR UPDATE
            "#,
        )
        .bind(tenant_id)
        .bind(debt_id)
        .fetch_optional(conn)
        .await
        .map_err(|e| persistence("Failed to lock debt", e))?;

        Ok(debt)
    }

    /// Transition a locked PENDING debt to a terminal state. The status
    /// predicate is the double-settlement guard.
    pub async fn finish_debt(
        conn: &mut PgConnection,
        debt_id: Uuid,
        status: DebtStatus,
        settled_amount: Option<Decimal>,
        settled_by: Option<Uuid>,
    ) -> Result<Debt, AppError> {
        let debt = sqlx::query_as::<_, Debt>(
            r#"
            UPDATE debts
            SET status = $2, settled_amount = $3, settled_at = CASE WHEN $2 = 'settled' THEN now() END,
                settled_by = $4, updated_utc = now()
            WHERE debt_id = $1 AND status = 'pending'
            RETURNING debt_id, tenant_id, plate, principal_amount, origin, status, session_id, notes,
                      settled_amount, settled_at, settled_by, created_utc, updated_utc
            "#,
        )
        .bind(debt_id)
        .bind(status.as_str())
        .bind(settled_amount)
        .bind(settled_by)
        .fetch_optional(conn)
        .await
        .map_err(|e| persistence("Failed to update debt", e))?;

        debt.ok_or_else(|| {
            AppError::conflict(
                codes::DEBT_NOT_PENDING,
                format!("Debt {} is not pending", debt_id),
            )
        })
    }

    /// Load a shift with a row lock.
    pub async fn shift_for_update(
        conn: &mut PgConnection,
        tenant_id: Uuid,
        shift_id: Uuid,
    ) -> Result<Option<Shift>, AppError> {
        let shift = sqlx::query_as::<_, Shift>(
            r#"
            SELECT shift_id, tenant_id, operator_id, sector_id, device_id, status, opening_float, opened_at,
                   closed_at, closing_declared_cash, expected_cash, cash_over_short, closed_by, notes,
                   created_utc, updated_utc
            FROM shifts
            WHERE tenant_id = $1 AND shift_id = $2
            FOR UPDATE
            "#,
        )
        .bind(tenant_id)
        .bind(shift_id)
        .fetch_optional(conn)
        .await
        .map_err(|e| persistence("Failed to lock shift", e))?;

        Ok(shift)
    }

    /// Lock the operator's OPEN shift, if any, so a concurrent close cannot
    /// race the payment being recorded into its drawer.
    pub async fn open_shift_for_operator(
        conn: &mut PgConnection,
        tenant_id: Uuid,
        operator_id: Uuid,
    ) -> Result<Option<Shift>, AppError> {
        let shift = sqlx::query_as::<_, Shift>(
            r#"
            SELECT shift_id, tenant_id, operator_id, sector_id, device_id, status, opening_float, opened_at,
                   closed_at, closing_declared_cash, expected_cash, cash_over_short, closed_by, notes,
                   created_utc, updated_utc
            FROM shifts
            WHERE tenant_id = $1 AND operator_id = $2 AND status = 'open'
            ORDER BY opened_at DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(tenant_id)
        .bind(operator_id)
        .fetch_optional(conn)
        .await
        .map_err(|e| persistence("Failed to lock open shift", e))?;

        Ok(shift)
    }

    /// Append an operation row to a shift's ledger.
    pub async fn insert_shift_operation(
        conn: &mut PgConnection,
        tenant_id: Uuid,
        shift_id: Uuid,
        kind: OperationKind,
        amount: Decimal,
        reference_id: Option<Uuid>,
    ) -> Result<ShiftOperation, AppError> {
        let operation = sqlx::query_as::<_, ShiftOperation>(
            r#"
            INSERT INTO shift_operations (operation_id, tenant_id, shift_id, kind, amount, reference_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING operation_id, tenant_id, shift_id, kind, amount, reference_id, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(shift_id)
        .bind(kind.as_str())
        .bind(amount)
        .bind(reference_id)
        .fetch_one(conn)
        .await
        .map_err(|e| persistence("Failed to append shift operation", e))?;

        Ok(operation)
    }

    /// Append a manual cash adjustment row.
    pub async fn insert_cash_adjustment(
        conn: &mut PgConnection,
        tenant_id: Uuid,
        shift_id: Uuid,
        kind: OperationKind,
        amount: Decimal,
        reason: Option<&str>,
        created_by: Option<Uuid>,
    ) -> Result<CashAdjustment, AppError> {
        let adjustment = sqlx::query_as::<_, CashAdjustment>(
            r#"
            INSERT INTO cash_adjustments (adjustment_id, tenant_id, shift_id, kind, amount, reason, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING adjustment_id, tenant_id, shift_id, kind, amount, reason, created_by, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(shift_id)
        .bind(kind.as_str())
        .bind(amount)
        .bind(reason)
        .bind(created_by)
        .fetch_one(conn)
        .await
        .map_err(|e| persistence("Failed to append cash adjustment", e))?;

        Ok(adjustment)
    }

    /// Number of ledger rows on a shift. Used by cancel, which only applies
    /// to shifts with no monetary operations.
    pub async fn count_shift_operations(
        conn: &mut PgConnection,
        tenant_id: Uuid,
        shift_id: Uuid,
    ) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM shift_operations WHERE tenant_id = $1 AND shift_id = $2",
        )
        .bind(tenant_id)
        .bind(shift_id)
        .fetch_one(conn)
        .await
        .map_err(|e| persistence("Failed to count shift operations", e))?;

        Ok(count)
    }

    /// Adjustments query usable inside a transaction.
    pub async fn adjustments_for_shift_tx(
        conn: &mut PgConnection,
        tenant_id: Uuid,
        shift_id: Uuid,
    ) -> Result<Vec<CashAdjustment>, AppError> {
        let adjustments = sqlx::query_as::<_, CashAdjustment>(
            r#"
            SELECT adjustment_id, tenant_id, shift_id, kind, amount, reason, created_by, created_utc
            FROM cash_adjustments
            WHERE tenant_id = $1 AND shift_id = $2
            ORDER BY created_utc
            "#,
        )
        .bind(tenant_id)
        .bind(shift_id)
        .fetch_all(conn)
        .await
        .map_err(|e| persistence("Failed to list adjustments", e))?;

        Ok(adjustments)
    }

    /// Payments query usable inside a transaction.
    pub async fn payments_for_shift_tx(
        conn: &mut PgConnection,
        tenant_id: Uuid,
        shift_id: Uuid,
    ) -> Result<Vec<Payment>, AppError> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT payment_id, tenant_id, session_id, debt_id, shift_id, amount, method, status, provider_txn_id, provider_ref, created_utc
            FROM payments
            WHERE tenant_id = $1 AND shift_id = $2
            ORDER BY created_utc
            "#,
        )
        .bind(tenant_id)
        .bind(shift_id)
        .fetch_all(conn)
        .await
        .map_err(|e| persistence("Failed to list shift payments", e))?;

        Ok(payments)
    }

    /// Transition a locked OPEN shift to a terminal state, persisting the
    /// reconciliation result on close.
    #[allow(clippy::too_many_arguments)]
    pub async fn finish_shift(
        conn: &mut PgConnection,
        shift_id: Uuid,
        status: ShiftStatus,
        declared_cash: Option<Decimal>,
        expected_cash: Option<Decimal>,
        cash_over_short: Option<Decimal>,
        closed_by: Option<Uuid>,
        notes: Option<&str>,
    ) -> Result<Shift, AppError> {
        let shift = sqlx::query_as::<_, Shift>(
            r#"
            UPDATE shifts
            SET status = $2, closed_at = now(), closing_declared_cash = $3, expected_cash = $4,
                cash_over_short = $5, closed_by = $6, notes = COALESCE($7, notes), updated_utc = now()
            WHERE shift_id = $1 AND status = 'open'
            RETURNING shift_id, tenant_id, operator_id, sector_id, device_id, status, opening_float, opened_at,
                      closed_at, closing_declared_cash, expected_cash, cash_over_short, closed_by, notes,
                      created_utc, updated_utc
            "#,
        )
        .bind(shift_id)
        .bind(status.as_str())
        .bind(declared_cash)
        .bind(expected_cash)
        .bind(cash_over_short)
        .bind(closed_by)
        .bind(notes)
        .fetch_optional(conn)
        .await
        .map_err(|e| persistence("Failed to close shift", e))?;

        shift.ok_or_else(|| {
            AppError::conflict(
                codes::SHIFT_NOT_OPEN,
                format!("Shift {} is not open", shift_id),
            )
        })
    }

    /// Look up a payment by the provider's transaction id. Webhook replays
    /// resolve here instead of creating a second payment.
    pub async fn payment_by_provider_txn(
        conn: &mut PgConnection,
        tenant_id: Uuid,
        provider_txn_id: &str,
    ) -> Result<Option<Payment>, AppError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT payment_id, tenant_id, session_id, debt_id, shift_id, amount, method, status, provider_txn_id, provider_ref, created_utc
            FROM payments
            WHERE tenant_id = $1 AND provider_txn_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(provider_txn_id)
        .fetch_optional(conn)
        .await
        .map_err(|e| persistence("Failed to look up provider transaction", e))?;

        Ok(payment)
    }
}
