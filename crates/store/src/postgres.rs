use async_trait::async_trait;
use common::{
    CouponId, MemberCouponId, MemberId, OrderId, Page, PageRequest, PaymentId,
};
use domain::{
    Aggregate, Coupon, CouponEvent, CouponSearchCondition, MemberCoupon, MemberCouponEvent, Order,
    OrderEvent, OrderSearchCondition, Payment, PaymentEvent,
};
use sqlx::{
    PgConnection, PgPool, Postgres, QueryBuilder, Row,
    postgres::{PgPoolOptions, PgRow},
};
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventId, Result, StoreError, Version, build_envelopes,
    error::constraints,
    store::{CouponRepository, EventLog, OrderRepository, PaymentRepository},
};

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn decode<A: Aggregate>(row: PgRow) -> Result<A> {
    let state: serde_json::Value = row.try_get("state")?;
    let version: i64 = row.try_get("version")?;
    let mut aggregate: A = serde_json::from_value(state)?;
    aggregate.set_version(Version::new(version));
    Ok(aggregate)
}

fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
    let metadata: serde_json::Value = row.try_get("metadata")?;

    Ok(EventEnvelope {
        event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
        event_type: row.try_get("event_type")?,
        aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
        aggregate_type: row.try_get("aggregate_type")?,
        version: Version::new(row.try_get("version")?),
        timestamp: row.try_get("timestamp")?,
        payload: row.try_get("payload")?,
        metadata: serde_json::from_value(metadata)?,
    })
}

/// Maps unique violations to `DuplicateKey`; everything else stays a database error.
fn map_write_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
        && let Some(constraint) = db_err.constraint()
    {
        return StoreError::DuplicateKey {
            constraint: constraint.to_string(),
        };
    }
    StoreError::Database(e)
}

/// Builds the conflict error with the version currently stored in `table`.
async fn conflict(
    conn: &mut PgConnection,
    table: &'static str,
    aggregate_id: AggregateId,
    expected: Version,
) -> StoreError {
    let sql = format!("SELECT version FROM {table} WHERE id = $1");
    let actual = match sqlx::query_scalar::<_, i64>(&sql)
        .bind(aggregate_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
    {
        Ok(version) => Version::new(version.unwrap_or(0)),
        Err(e) => return StoreError::Database(e),
    };

    tracing::debug!(%aggregate_id, %expected, %actual, table, "version conflict");
    metrics::counter!("store_concurrency_conflicts_total").increment(1);
    StoreError::ConcurrencyConflict {
        aggregate_id,
        expected,
        actual,
    }
}

/// Appends the envelopes for `events` to the outbox.
async fn append_events<A: Aggregate>(
    conn: &mut PgConnection,
    aggregate: &A,
    events: &[A::Event],
) -> Result<()> {
    for event in build_envelopes(aggregate, events)? {
        let metadata = serde_json::to_value(&event.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO domain_events (id, event_type, aggregate_id, aggregate_type, version, timestamp, payload, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.event_id.as_uuid())
        .bind(&event.event_type)
        .bind(event.aggregate_id.as_uuid())
        .bind(&event.aggregate_type)
        .bind(event.version.as_i64())
        .bind(event.timestamp)
        .bind(&event.payload)
        .bind(metadata)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some(constraints::AGGREGATE_VERSION)
            {
                return StoreError::ConcurrencyConflict {
                    aggregate_id: event.aggregate_id,
                    expected: aggregate.version(),
                    actual: event.version,
                };
            }
            StoreError::Database(e)
        })?;
    }
    Ok(())
}

/// Serializes the aggregate as it will be stored, at its new version.
fn stored_state<A: Aggregate>(aggregate: &A, new_version: Version) -> Result<serde_json::Value> {
    let mut stored = aggregate.clone();
    stored.set_version(new_version);
    Ok(serde_json::to_value(&stored)?)
}

async fn write_order(conn: &mut PgConnection, order: &Order, events: &[OrderEvent]) -> Result<Version> {
    if events.is_empty() {
        return Ok(order.version());
    }
    let expected = order.version();
    let new_version = expected.advance(events.len());
    let state = stored_state(order, new_version)?;

    let result = if expected.is_initial() {
        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, member_id, status, created_at, updated_at, version, state)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.order_number())
        .bind(order.member_id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.created_at())
        .bind(order.updated_at())
        .bind(new_version.as_i64())
        .bind(state)
        .execute(&mut *conn)
        .await
    } else {
        sqlx::query(
            r#"
            UPDATE orders SET status = $2, updated_at = $3, version = $4, state = $5
            WHERE id = $1 AND version = $6
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.updated_at())
        .bind(new_version.as_i64())
        .bind(state)
        .bind(expected.as_i64())
        .execute(&mut *conn)
        .await
    };

    if result.map_err(map_write_error)?.rows_affected() == 0 {
        return Err(conflict(conn, "orders", order.aggregate_id(), expected).await);
    }
    append_events(conn, order, events).await?;
    Ok(new_version)
}

async fn write_payment(
    conn: &mut PgConnection,
    payment: &Payment,
    events: &[PaymentEvent],
) -> Result<Version> {
    if events.is_empty() {
        return Ok(payment.version());
    }
    let expected = payment.version();
    let new_version = expected.advance(events.len());
    let state = stored_state(payment, new_version)?;

    let result = if expected.is_initial() {
        sqlx::query(
            r#"
            INSERT INTO payments (id, transaction_id, order_id, status, created_at, updated_at, version, state)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(payment.id().as_uuid())
        .bind(payment.transaction_id())
        .bind(payment.order_id().as_uuid())
        .bind(payment.status().as_str())
        .bind(payment.created_at())
        .bind(payment.updated_at())
        .bind(new_version.as_i64())
        .bind(state)
        .execute(&mut *conn)
        .await
    } else {
        sqlx::query(
            r#"
            UPDATE payments SET status = $2, updated_at = $3, version = $4, state = $5
            WHERE id = $1 AND version = $6
            "#,
        )
        .bind(payment.id().as_uuid())
        .bind(payment.status().as_str())
        .bind(payment.updated_at())
        .bind(new_version.as_i64())
        .bind(state)
        .bind(expected.as_i64())
        .execute(&mut *conn)
        .await
    };

    if result.map_err(map_write_error)?.rows_affected() == 0 {
        return Err(conflict(conn, "payments", payment.aggregate_id(), expected).await);
    }
    append_events(conn, payment, events).await?;
    Ok(new_version)
}

async fn write_coupon(
    conn: &mut PgConnection,
    coupon: &Coupon,
    events: &[CouponEvent],
) -> Result<Version> {
    if events.is_empty() {
        return Ok(coupon.version());
    }
    let expected = coupon.version();
    let new_version = expected.advance(events.len());
    let state = stored_state(coupon, new_version)?;

    let result = if expected.is_initial() {
        sqlx::query(
            r#"
            INSERT INTO coupons (id, code, active, deleted, created_at, updated_at, version, state)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(coupon.id().as_uuid())
        .bind(coupon.code())
        .bind(coupon.is_active())
        .bind(coupon.is_deleted())
        .bind(coupon.created_at())
        .bind(coupon.updated_at())
        .bind(new_version.as_i64())
        .bind(state)
        .execute(&mut *conn)
        .await
    } else {
        sqlx::query(
            r#"
            UPDATE coupons SET active = $2, deleted = $3, updated_at = $4, version = $5, state = $6
            WHERE id = $1 AND version = $7
            "#,
        )
        .bind(coupon.id().as_uuid())
        .bind(coupon.is_active())
        .bind(coupon.is_deleted())
        .bind(coupon.updated_at())
        .bind(new_version.as_i64())
        .bind(state)
        .bind(expected.as_i64())
        .execute(&mut *conn)
        .await
    };

    if result.map_err(map_write_error)?.rows_affected() == 0 {
        return Err(conflict(conn, "coupons", coupon.aggregate_id(), expected).await);
    }
    append_events(conn, coupon, events).await?;
    Ok(new_version)
}

async fn write_member_coupon(
    conn: &mut PgConnection,
    member_coupon: &MemberCoupon,
    events: &[MemberCouponEvent],
) -> Result<Version> {
    if events.is_empty() {
        return Ok(member_coupon.version());
    }
    let expected = member_coupon.version();
    let new_version = expected.advance(events.len());
    let state = stored_state(member_coupon, new_version)?;

    let result = if expected.is_initial() {
        sqlx::query(
            r#"
            INSERT INTO member_coupons (id, member_id, coupon_id, used, issued_at, updated_at, version, state)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(member_coupon.id().as_uuid())
        .bind(member_coupon.member_id().as_uuid())
        .bind(member_coupon.coupon_id().as_uuid())
        .bind(member_coupon.is_used())
        .bind(member_coupon.issued_at())
        .bind(member_coupon.updated_at())
        .bind(new_version.as_i64())
        .bind(state)
        .execute(&mut *conn)
        .await
    } else {
        sqlx::query(
            r#"
            UPDATE member_coupons SET used = $2, updated_at = $3, version = $4, state = $5
            WHERE id = $1 AND version = $6
            "#,
        )
        .bind(member_coupon.id().as_uuid())
        .bind(member_coupon.is_used())
        .bind(member_coupon.updated_at())
        .bind(new_version.as_i64())
        .bind(state)
        .bind(expected.as_i64())
        .execute(&mut *conn)
        .await
    };

    if result.map_err(map_write_error)?.rows_affected() == 0 {
        return Err(conflict(conn, "member_coupons", member_coupon.aggregate_id(), expected).await);
    }
    append_events(conn, member_coupon, events).await?;
    Ok(new_version)
}

fn push_order_filters(qb: &mut QueryBuilder<'_, Postgres>, condition: &OrderSearchCondition) {
    qb.push(" WHERE 1=1");
    if let Some(member_id) = condition.member_id {
        qb.push(" AND member_id = ").push_bind(member_id.as_uuid());
    }
    if let Some(status) = condition.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(number) = condition.order_number_filter() {
        qb.push(" AND order_number ILIKE ")
            .push_bind(contains_pattern(number))
            .push(" ESCAPE '\\'");
    }
    if let Some(start) = condition.start_date {
        qb.push(" AND created_at >= ").push_bind(start);
    }
    if let Some(end) = condition.end_date {
        qb.push(" AND created_at <= ").push_bind(end);
    }
}

fn push_coupon_filters(qb: &mut QueryBuilder<'_, Postgres>, condition: &CouponSearchCondition) {
    qb.push(" WHERE deleted = FALSE");
    if condition.active_only {
        qb.push(" AND active = TRUE");
    }
    if let Some(code) = condition.code_filter() {
        qb.push(" AND code ILIKE ")
            .push_bind(contains_pattern(&code))
            .push(" ESCAPE '\\'");
    }
}

/// `%needle%` with LIKE metacharacters in `needle` matched literally.
fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn push_page(qb: &mut QueryBuilder<'_, Postgres>, page: PageRequest) {
    qb.push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(page.size() as i64)
        .push(" OFFSET ")
        .push_bind(page.offset() as i64);
}

#[async_trait]
impl OrderRepository for PostgresStore {
    async fn save_order(&self, order: &Order, events: &[OrderEvent]) -> Result<Version> {
        let mut tx = self.pool.begin().await?;
        let version = write_order(&mut tx, order, events).await?;
        tx.commit().await?;
        Ok(version)
    }

    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        sqlx::query("SELECT state, version FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(decode)
            .transpose()
    }

    async fn find_order_by_number(&self, order_number: &str) -> Result<Option<Order>> {
        sqlx::query("SELECT state, version FROM orders WHERE order_number = $1")
            .bind(order_number)
            .fetch_optional(&self.pool)
            .await?
            .map(decode)
            .transpose()
    }

    async fn search_orders(
        &self,
        condition: &OrderSearchCondition,
        page: PageRequest,
    ) -> Result<Page<Order>> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM orders");
        push_order_filters(&mut count, condition);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new("SELECT state, version FROM orders");
        push_order_filters(&mut select, condition);
        push_page(&mut select, page);
        let rows = select.build().fetch_all(&self.pool).await?;

        let content = rows.into_iter().map(decode).collect::<Result<Vec<Order>>>()?;
        Ok(Page::new(content, page, total as u64))
    }
}

#[async_trait]
impl PaymentRepository for PostgresStore {
    async fn save_payment(&self, payment: &Payment, events: &[PaymentEvent]) -> Result<Version> {
        let mut tx = self.pool.begin().await?;
        let version = write_payment(&mut tx, payment, events).await?;
        tx.commit().await?;
        Ok(version)
    }

    async fn save_settlement(
        &self,
        payment: &Payment,
        payment_events: &[PaymentEvent],
        order: &Order,
        order_events: &[OrderEvent],
    ) -> Result<(Version, Version)> {
        let mut tx = self.pool.begin().await?;
        let payment_version = write_payment(&mut tx, payment, payment_events).await?;
        let order_version = write_order(&mut tx, order, order_events).await?;
        tx.commit().await?;
        Ok((payment_version, order_version))
    }

    async fn find_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>> {
        sqlx::query("SELECT state, version FROM payments WHERE id = $1")
            .bind(payment_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(decode)
            .transpose()
    }

    async fn find_payment_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Payment>> {
        sqlx::query("SELECT state, version FROM payments WHERE transaction_id = $1")
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await?
            .map(decode)
            .transpose()
    }

    async fn find_payments_by_order(&self, order_id: OrderId) -> Result<Vec<Payment>> {
        let rows = sqlx::query(
            "SELECT state, version FROM payments WHERE order_id = $1 ORDER BY created_at DESC",
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode).collect()
    }
}

#[async_trait]
impl CouponRepository for PostgresStore {
    async fn save_coupon(&self, coupon: &Coupon, events: &[CouponEvent]) -> Result<Version> {
        let mut tx = self.pool.begin().await?;
        let version = write_coupon(&mut tx, coupon, events).await?;
        tx.commit().await?;
        Ok(version)
    }

    async fn find_coupon(&self, coupon_id: CouponId) -> Result<Option<Coupon>> {
        sqlx::query("SELECT state, version FROM coupons WHERE id = $1")
            .bind(coupon_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(decode)
            .transpose()
    }

    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        sqlx::query("SELECT state, version FROM coupons WHERE code = $1")
            .bind(code.trim().to_uppercase())
            .fetch_optional(&self.pool)
            .await?
            .map(decode)
            .transpose()
    }

    async fn search_coupons(
        &self,
        condition: &CouponSearchCondition,
        page: PageRequest,
    ) -> Result<Page<Coupon>> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM coupons");
        push_coupon_filters(&mut count, condition);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new("SELECT state, version FROM coupons");
        push_coupon_filters(&mut select, condition);
        push_page(&mut select, page);
        let rows = select.build().fetch_all(&self.pool).await?;

        let content = rows.into_iter().map(decode).collect::<Result<Vec<Coupon>>>()?;
        Ok(Page::new(content, page, total as u64))
    }

    async fn save_member_coupon(
        &self,
        member_coupon: &MemberCoupon,
        events: &[MemberCouponEvent],
    ) -> Result<Version> {
        let mut tx = self.pool.begin().await?;
        let version = write_member_coupon(&mut tx, member_coupon, events).await?;
        tx.commit().await?;
        Ok(version)
    }

    async fn find_member_coupon(
        &self,
        member_coupon_id: MemberCouponId,
    ) -> Result<Option<MemberCoupon>> {
        sqlx::query("SELECT state, version FROM member_coupons WHERE id = $1")
            .bind(member_coupon_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(decode)
            .transpose()
    }

    async fn find_member_coupon_by_member_and_coupon(
        &self,
        member_id: MemberId,
        coupon_id: CouponId,
    ) -> Result<Option<MemberCoupon>> {
        sqlx::query(
            "SELECT state, version FROM member_coupons WHERE member_id = $1 AND coupon_id = $2",
        )
        .bind(member_id.as_uuid())
        .bind(coupon_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(decode)
        .transpose()
    }

    async fn find_member_coupons(&self, member_id: MemberId) -> Result<Vec<MemberCoupon>> {
        let rows = sqlx::query(
            "SELECT state, version FROM member_coupons WHERE member_id = $1 ORDER BY issued_at DESC",
        )
        .bind(member_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode).collect()
    }

    async fn save_redemption(
        &self,
        coupon: &Coupon,
        coupon_events: &[CouponEvent],
        member_coupon: &MemberCoupon,
        member_coupon_events: &[MemberCouponEvent],
    ) -> Result<(Version, Version)> {
        let mut tx = self.pool.begin().await?;
        let coupon_version = write_coupon(&mut tx, coupon, coupon_events).await?;
        let member_coupon_version =
            write_member_coupon(&mut tx, member_coupon, member_coupon_events).await?;
        tx.commit().await?;
        Ok((coupon_version, member_coupon_version))
    }
}

#[async_trait]
impl EventLog for PostgresStore {
    async fn events_for_aggregate(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, aggregate_id, aggregate_type, version, timestamp, payload, metadata
            FROM domain_events
            WHERE aggregate_id = $1
            ORDER BY version ASC
            "#,
        )
        .bind(aggregate_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_event).collect()
    }
}
