use crate::models::{
    CompletedCapture, NewPayment, NewUser, PaymentRow, PaymentStatus, QuotaRow, UserRow,
};
use crate::Database;
use anyhow::{Result, anyhow, bail};
use chrono::NaiveDate;
use rusqlite::{Connection, Row};
use saltmine_types::models::QuotaLimits;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, name, email, password_hash, provider, membership_type, \
     membership_expires_at, is_active, created_at, updated_at";

const QUOTA_COLUMNS: &str = "id, user_id, date, searches_used, searches_limit, \
     messages_used, messages_limit, created_at";

const PAYMENT_COLUMNS: &str = "id, user_id, provider, provider_order_id, provider_payment_id, \
     amount, currency, plan_id, status, metadata, created_at, completed_at";

/// Storage form of a quota day.
pub fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

impl Database {
    // -- Users --

    /// Inserts the user together with the quota row for `day`.
    pub fn create_user(&self, user: &NewUser<'_>, day: NaiveDate, limits: QuotaLimits) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO users (id, name, email, password_hash) VALUES (?1, ?2, ?3, ?4)",
                (user.id, user.name, user.email, user.password_hash),
            )?;
            insert_quota_if_missing(&tx, user.id, day, limits)?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS);
            conn.query_row(&sql, [email], map_user).optional()
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn update_password(&self, id: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET password_hash = ?1, updated_at = datetime('now') WHERE id = ?2",
                (password_hash, id),
            )?;
            if changed == 0 {
                bail!("User not found: {}", id);
            }
            Ok(())
        })
    }

    pub fn update_name(&self, id: &str, name: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET name = ?1, updated_at = datetime('now') WHERE id = ?2",
                (name, id),
            )?;
            query_user_by_id(conn, id)
        })
    }

    // -- Quotas --

    pub fn get_quota(&self, user_id: &str, day: NaiveDate) -> Result<Option<QuotaRow>> {
        self.with_conn(|conn| query_quota(conn, user_id, day))
    }

    /// Returns the quota row for `day`, creating it with `limits` on first
    /// access. Repeated calls on the same day return the same row.
    pub fn get_or_create_quota(&self, user_id: &str, day: NaiveDate, limits: QuotaLimits) -> Result<QuotaRow> {
        self.with_conn(|conn| {
            insert_quota_if_missing(conn, user_id, day, limits)?;
            query_quota(conn, user_id, day)?
                .ok_or_else(|| anyhow!("Quota row vanished for user {}", user_id))
        })
    }

    /// Unconditional `searches_used + 1`.
    pub fn increment_searches(&self, quota_id: &str) -> Result<QuotaRow> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE user_quotas SET searches_used = searches_used + 1 WHERE id = ?1",
                [quota_id],
            )?;
            if changed == 0 {
                bail!("Quota not found: {}", quota_id);
            }
            query_quota_by_id(conn, quota_id)
        })
    }

    /// Increments only while `searches_used < searches_limit`. The check and
    /// the write are one statement, so concurrent requests cannot overshoot.
    /// Returns `None` when the limit has been reached.
    pub fn try_increment_searches(&self, quota_id: &str) -> Result<Option<QuotaRow>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE user_quotas SET searches_used = searches_used + 1
                 WHERE id = ?1 AND searches_used < searches_limit",
                [quota_id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_quota_by_id(conn, quota_id).map(Some)
        })
    }

    /// Most recent quota rows first.
    pub fn quota_history(&self, user_id: &str, limit: u32) -> Result<Vec<QuotaRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM user_quotas WHERE user_id = ?1 ORDER BY date DESC LIMIT ?2",
                QUOTA_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, limit], map_quota)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn total_searches(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let total = conn.query_row(
                "SELECT COALESCE(SUM(searches_used), 0) FROM user_quotas WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(total)
        })
    }

    // -- Guests --

    pub fn guest_searches(&self, guest_id: &str, day: NaiveDate) -> Result<i64> {
        self.with_conn(|conn| {
            let used = conn
                .query_row(
                    "SELECT searches_used FROM guest_usage WHERE guest_id = ?1 AND date = ?2",
                    (guest_id, day_key(day)),
                    |row| row.get(0),
                )
                .optional()?;
            Ok(used.unwrap_or(0))
        })
    }

    /// Counts one guest search and returns the new total for the day.
    pub fn record_guest_search(&self, guest_id: &str, day: NaiveDate) -> Result<i64> {
        self.with_conn(|conn| {
            let used = conn.query_row(
                "INSERT INTO guest_usage (guest_id, date, searches_used) VALUES (?1, ?2, 1)
                 ON CONFLICT(guest_id, date) DO UPDATE SET searches_used = searches_used + 1
                 RETURNING searches_used",
                (guest_id, day_key(day)),
                |row| row.get(0),
            )?;
            Ok(used)
        })
    }

    // -- Payments --

    pub fn insert_payment(&self, payment: &NewPayment<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO payments (id, user_id, provider, provider_order_id, amount, currency, plan_id, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    payment.id,
                    payment.user_id,
                    payment.provider,
                    payment.provider_order_id,
                    payment.amount,
                    payment.currency,
                    payment.plan_id,
                    PaymentStatus::Created.as_str(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_payment_by_order(&self, provider_order_id: &str) -> Result<Option<PaymentRow>> {
        self.with_conn(|conn| query_payment_by_order(conn, provider_order_id))
    }

    /// Applies a successful capture atomically: the payment becomes COMPLETED,
    /// the user gets the plan's tier and expiry, and today's quota limits are
    /// raised. Fails without side effects if the order was already completed.
    pub fn complete_capture(
        &self,
        capture: &CompletedCapture<'_>,
        day: NaiveDate,
        limits: QuotaLimits,
    ) -> Result<(PaymentRow, UserRow)> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let existing = query_payment_by_order(&tx, capture.provider_order_id)?;
            match existing {
                Some(row) if row.is_completed() => {
                    bail!("Order {} already completed", capture.provider_order_id);
                }
                Some(_) => {
                    tx.execute(
                        "UPDATE payments
                         SET provider_payment_id = ?1, amount = ?2, currency = ?3, plan_id = ?4,
                             status = ?5, metadata = ?6, completed_at = datetime('now')
                         WHERE provider_order_id = ?7",
                        rusqlite::params![
                            capture.provider_payment_id,
                            capture.amount,
                            capture.currency,
                            capture.plan_id,
                            PaymentStatus::Completed.as_str(),
                            capture.metadata,
                            capture.provider_order_id,
                        ],
                    )?;
                }
                None => {
                    tx.execute(
                        "INSERT INTO payments (id, user_id, provider, provider_order_id, provider_payment_id,
                                               amount, currency, plan_id, status, metadata, completed_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, datetime('now'))",
                        rusqlite::params![
                            capture.payment_id,
                            capture.user_id,
                            capture.provider,
                            capture.provider_order_id,
                            capture.provider_payment_id,
                            capture.amount,
                            capture.currency,
                            capture.plan_id,
                            PaymentStatus::Completed.as_str(),
                            capture.metadata,
                        ],
                    )?;
                }
            }

            let changed = tx.execute(
                "UPDATE users SET membership_type = ?1, membership_expires_at = ?2, updated_at = datetime('now')
                 WHERE id = ?3",
                (capture.membership.as_str(), capture.membership_expires_at, capture.user_id),
            )?;
            if changed == 0 {
                bail!("User not found: {}", capture.user_id);
            }

            upsert_limits(&tx, capture.user_id, day, limits)?;

            let payment = query_payment_by_order(&tx, capture.provider_order_id)?
                .ok_or_else(|| anyhow!("Payment row missing after capture"))?;
            let user = query_user_by_id(&tx, capture.user_id)?
                .ok_or_else(|| anyhow!("User row missing after capture"))?;

            tx.commit()?;
            Ok((payment, user))
        })
    }

    /// Sets the limits of `day`'s quota row, creating it when missing.
    /// Counters already used are kept.
    pub fn upsert_quota_limits(&self, user_id: &str, day: NaiveDate, limits: QuotaLimits) -> Result<QuotaRow> {
        self.with_conn(|conn| {
            upsert_limits(conn, user_id, day, limits)?;
            query_quota(conn, user_id, day)?
                .ok_or_else(|| anyhow!("Quota row vanished for user {}", user_id))
        })
    }

    /// Marks an order FAILED, inserting a placeholder row when the order was
    /// never recorded. Completed orders are left untouched.
    pub fn record_failed_payment(&self, user_id: &str, provider_order_id: &str, reason: &str) -> Result<()> {
        self.with_conn(|conn| {
            let metadata = serde_json::json!({
                "error": reason,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            })
            .to_string();
            let changed = conn.execute(
                "UPDATE payments SET status = ?1, metadata = ?2
                 WHERE provider_order_id = ?3 AND status != ?4",
                rusqlite::params![
                    PaymentStatus::Failed.as_str(),
                    metadata,
                    provider_order_id,
                    PaymentStatus::Completed.as_str(),
                ],
            )?;
            if changed == 0 && query_payment_by_order(conn, provider_order_id)?.is_none() {
                conn.execute(
                    "INSERT INTO payments (id, user_id, provider, provider_order_id, amount, currency, plan_id, status, metadata)
                     VALUES (?1, ?2, 'PAYPAL', ?3, '0.00', 'USD', 'UNKNOWN', ?4, ?5)",
                    rusqlite::params![
                        Uuid::new_v4().to_string(),
                        user_id,
                        provider_order_id,
                        PaymentStatus::Failed.as_str(),
                        metadata,
                    ],
                )?;
            }
            Ok(())
        })
    }

    // -- Misc --

    /// SQLite's idea of the current UTC time.
    pub fn db_time(&self) -> Result<String> {
        self.with_conn(|conn| {
            let now = conn.query_row("SELECT datetime('now')", [], |row| row.get(0))?;
            Ok(now)
        })
    }
}

fn upsert_limits(conn: &Connection, user_id: &str, day: NaiveDate, limits: QuotaLimits) -> Result<()> {
    conn.execute(
        "INSERT INTO user_quotas (id, user_id, date, searches_limit, messages_limit)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id, date) DO UPDATE
         SET searches_limit = excluded.searches_limit, messages_limit = excluded.messages_limit",
        rusqlite::params![
            Uuid::new_v4().to_string(),
            user_id,
            day_key(day),
            limits.searches,
            limits.messages,
        ],
    )?;
    Ok(())
}

fn insert_quota_if_missing(conn: &Connection, user_id: &str, day: NaiveDate, limits: QuotaLimits) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO user_quotas (id, user_id, date, searches_limit, messages_limit)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            Uuid::new_v4().to_string(),
            user_id,
            day_key(day),
            limits.searches,
            limits.messages,
        ],
    )?;
    Ok(())
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
    conn.query_row(&sql, [id], map_user).optional()
}

fn query_quota(conn: &Connection, user_id: &str, day: NaiveDate) -> Result<Option<QuotaRow>> {
    let sql = format!("SELECT {} FROM user_quotas WHERE user_id = ?1 AND date = ?2", QUOTA_COLUMNS);
    conn.query_row(&sql, (user_id, day_key(day)), map_quota).optional()
}

fn query_quota_by_id(conn: &Connection, id: &str) -> Result<QuotaRow> {
    let sql = format!("SELECT {} FROM user_quotas WHERE id = ?1", QUOTA_COLUMNS);
    Ok(conn.query_row(&sql, [id], map_quota)?)
}

fn query_payment_by_order(conn: &Connection, provider_order_id: &str) -> Result<Option<PaymentRow>> {
    let sql = format!("SELECT {} FROM payments WHERE provider_order_id = ?1", PAYMENT_COLUMNS);
    conn.query_row(&sql, [provider_order_id], map_payment).optional()
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        provider: row.get(4)?,
        membership_type: row.get(5)?,
        membership_expires_at: row.get(6)?,
        is_active: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn map_quota(row: &Row<'_>) -> rusqlite::Result<QuotaRow> {
    Ok(QuotaRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        date: row.get(2)?,
        searches_used: row.get(3)?,
        searches_limit: row.get(4)?,
        messages_used: row.get(5)?,
        messages_limit: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn map_payment(row: &Row<'_>) -> rusqlite::Result<PaymentRow> {
    Ok(PaymentRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        provider: row.get(2)?,
        provider_order_id: row.get(3)?,
        provider_payment_id: row.get(4)?,
        amount: row.get(5)?,
        currency: row.get(6)?,
        plan_id: row.get(7)?,
        status: row.get(8)?,
        metadata: row.get(9)?,
        created_at: row.get(10)?,
        completed_at: row.get(11)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use saltmine_types::models::Tier;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn free() -> QuotaLimits {
        QuotaLimits { searches: 3, messages: 10 }
    }

    fn db_with_user(id: &str) -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user(
            &NewUser {
                id,
                name: "Ada",
                email: &format!("{}@example.com", id),
                password_hash: "hash",
            },
            day("2026-01-01"),
            free(),
        )
        .unwrap();
        db
    }

    #[test]
    fn signup_creates_user_and_first_quota() {
        let db = db_with_user("u1");
        let user = db.get_user_by_email("u1@example.com").unwrap().unwrap();
        assert_eq!(user.membership(), Tier::Free);
        assert!(user.is_active);
        assert_eq!(user.provider, "credentials");

        let quota = db.get_quota("u1", day("2026-01-01")).unwrap().unwrap();
        assert_eq!(quota.searches_used, 0);
        assert_eq!(quota.searches_limit, 3);
        assert_eq!(quota.messages_limit, 10);
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let db = db_with_user("u1");
        let dup = db.create_user(
            &NewUser { id: "u2", name: "B", email: "u1@example.com", password_hash: "h" },
            day("2026-01-01"),
            free(),
        );
        assert!(dup.is_err());
        assert!(db.get_user_by_id("u2").unwrap().is_none());
    }

    #[test]
    fn get_or_create_quota_is_idempotent_per_day() {
        let db = db_with_user("u1");
        let d = day("2026-03-04");

        let first = db.get_or_create_quota("u1", d, free()).unwrap();
        db.increment_searches(&first.id).unwrap();
        let second = db
            .get_or_create_quota("u1", d, QuotaLimits { searches: 50, messages: 50 })
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.searches_used, 1);
        // Limits are fixed at creation time
        assert_eq!(second.searches_limit, 3);

        let rows: i64 = db
            .with_conn(|c| {
                Ok(c.query_row(
                    "SELECT COUNT(*) FROM user_quotas WHERE user_id = 'u1' AND date = '2026-03-04'",
                    [],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn new_day_gets_new_row() {
        let db = db_with_user("u1");
        let a = db.get_or_create_quota("u1", day("2026-03-04"), free()).unwrap();
        let b = db.get_or_create_quota("u1", day("2026-03-05"), free()).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(db.quota_history("u1", 10).unwrap()[0].date, "2026-03-05");
    }

    #[test]
    fn upserted_limits_keep_usage() {
        let db = db_with_user("u1");
        let d = day("2026-01-01");
        let quota = db.get_quota("u1", d).unwrap().unwrap();
        db.increment_searches(&quota.id).unwrap();

        let raised = db.upsert_quota_limits("u1", d, QuotaLimits::unlimited()).unwrap();
        assert_eq!(raised.id, quota.id);
        assert_eq!(raised.searches_used, 1);
        assert_eq!(raised.searches_limit, QuotaLimits::UNLIMITED);

        let fresh = db.upsert_quota_limits("u1", day("2026-01-02"), free()).unwrap();
        assert_eq!(fresh.searches_used, 0);
        assert_eq!(fresh.searches_limit, 3);
    }

    #[test]
    fn guarded_increment_stops_at_limit() {
        let db = db_with_user("u1");
        let quota = db.get_or_create_quota("u1", day("2026-03-04"), free()).unwrap();

        for expected in 1..=3 {
            let row = db.try_increment_searches(&quota.id).unwrap().unwrap();
            assert_eq!(row.searches_used, expected);
        }
        assert!(db.try_increment_searches(&quota.id).unwrap().is_none());

        let row = db.get_quota("u1", day("2026-03-04")).unwrap().unwrap();
        assert_eq!(row.searches_used, 3);
        assert!(!row.has_searches_left());
    }

    #[test]
    fn unguarded_increment_counts_past_limit() {
        let db = db_with_user("u1");
        let quota = db
            .get_or_create_quota("u1", day("2026-03-04"), QuotaLimits { searches: 1, messages: 1 })
            .unwrap();
        db.increment_searches(&quota.id).unwrap();
        let row = db.increment_searches(&quota.id).unwrap();
        assert_eq!(row.searches_used, 2);
        assert!(db.increment_searches("missing").is_err());
    }

    #[test]
    fn total_searches_sums_all_days() {
        let db = db_with_user("u1");
        let a = db.get_or_create_quota("u1", day("2026-03-04"), free()).unwrap();
        let b = db.get_or_create_quota("u1", day("2026-03-05"), free()).unwrap();
        db.increment_searches(&a.id).unwrap();
        db.increment_searches(&b.id).unwrap();
        db.increment_searches(&b.id).unwrap();
        assert_eq!(db.total_searches("u1").unwrap(), 3);
        assert_eq!(db.total_searches("nobody").unwrap(), 0);
    }

    #[test]
    fn guest_usage_is_per_guest_per_day() {
        let db = Database::open_in_memory().unwrap();
        let d = day("2026-03-04");
        assert_eq!(db.guest_searches("g1", d).unwrap(), 0);
        assert_eq!(db.record_guest_search("g1", d).unwrap(), 1);
        assert_eq!(db.record_guest_search("g1", d).unwrap(), 2);
        assert_eq!(db.guest_searches("g1", d).unwrap(), 2);
        assert_eq!(db.guest_searches("g2", d).unwrap(), 0);
        assert_eq!(db.guest_searches("g1", day("2026-03-05")).unwrap(), 0);
    }

    fn capture<'a>(order: &'a str, expires: &'a str) -> CompletedCapture<'a> {
        CompletedCapture {
            payment_id: "p-new",
            user_id: "u1",
            provider: "PAYPAL",
            provider_order_id: order,
            provider_payment_id: "CAP-1",
            amount: "10.00",
            currency: "USD",
            plan_id: "PROFESSIONAL_MONTHLY",
            metadata: "{}",
            membership: Tier::Premium,
            membership_expires_at: expires,
        }
    }

    #[test]
    fn capture_completes_created_payment_and_upgrades_user() {
        let db = db_with_user("u1");
        db.insert_payment(&NewPayment {
            id: "p1",
            user_id: "u1",
            provider: "PAYPAL",
            provider_order_id: "ORDER1",
            amount: "10.00",
            currency: "USD",
            plan_id: "PROFESSIONAL_MONTHLY",
        })
        .unwrap();
        let d = day("2026-01-01");

        let (payment, user) = db
            .complete_capture(&capture("ORDER1", "2026-02-01T00:00:00+00:00"), d, QuotaLimits::unlimited())
            .unwrap();

        // The row written at order creation keeps its id
        assert_eq!(payment.id, "p1");
        assert!(payment.is_completed());
        assert_eq!(payment.provider_payment_id.as_deref(), Some("CAP-1"));
        assert_eq!(user.membership(), Tier::Premium);

        let quota = db.get_quota("u1", d).unwrap().unwrap();
        assert_eq!(quota.searches_limit, QuotaLimits::UNLIMITED);

        // A second capture of the same order changes nothing
        assert!(db
            .complete_capture(&capture("ORDER1", "2030-01-01T00:00:00+00:00"), d, QuotaLimits::unlimited())
            .is_err());
        let user = db.get_user_by_id("u1").unwrap().unwrap();
        assert_eq!(user.membership_expires_at.as_deref(), Some("2026-02-01T00:00:00+00:00"));
    }

    #[test]
    fn capture_without_prior_row_inserts_one() {
        let db = db_with_user("u1");
        let (payment, _) = db
            .complete_capture(&capture("ORDER2", "2026-02-01T00:00:00+00:00"), day("2026-01-02"), QuotaLimits::unlimited())
            .unwrap();
        assert_eq!(payment.id, "p-new");
        // The quota row for a day with no prior activity is created
        assert!(db.get_quota("u1", day("2026-01-02")).unwrap().is_some());
    }

    #[test]
    fn failed_capture_rolls_back() {
        let db = db_with_user("u1");
        let mut bad = capture("ORDER3", "2026-02-01T00:00:00+00:00");
        bad.user_id = "ghost";
        assert!(db.complete_capture(&bad, day("2026-01-01"), QuotaLimits::unlimited()).is_err());
        assert!(db.get_payment_by_order("ORDER3").unwrap().is_none());
    }

    #[test]
    fn failures_never_overwrite_completed_orders() {
        let db = db_with_user("u1");
        db.record_failed_payment("u1", "ORDER4", "card \"declined\"").unwrap();
        let row = db.get_payment_by_order("ORDER4").unwrap().unwrap();
        assert_eq!(row.status, "FAILED");
        assert_eq!(row.plan_id, "UNKNOWN");
        assert!(row.metadata.unwrap().contains("card \\\"declined\\\""));

        db.complete_capture(&capture("ORDER5", "2026-02-01T00:00:00+00:00"), day("2026-01-01"), QuotaLimits::unlimited())
            .unwrap();
        db.record_failed_payment("u1", "ORDER5", "late failure").unwrap();
        assert!(db.get_payment_by_order("ORDER5").unwrap().unwrap().is_completed());
    }

    #[test]
    fn profile_and_password_updates() {
        let db = db_with_user("u1");
        let user = db.update_name("u1", "Grace").unwrap().unwrap();
        assert_eq!(user.name, "Grace");
        db.update_password("u1", "new-hash").unwrap();
        let user = db.get_user_by_id("u1").unwrap().unwrap();
        assert_eq!(user.password_hash.as_deref(), Some("new-hash"));
        assert!(db.update_password("nobody", "x").is_err());
    }
}
