//! PostgreSQL store adapter

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{DatabaseError, DatabaseResult};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::collections::BTreeSet;
use tracing::info;
use uuid::Uuid;

use super::{AuditStore, MenuStore, PasswordResetStore, RbacStore, SessionStore, UserStore};
use crate::models::{
    AuditLogEntry, AuditLogFilters, Credentials, MenuItem, PasswordResetToken, Permission, Role,
    RoleWithPermissions, Session, User, UserRole,
};

const AUDIT_COLUMNS: &str = "id, timestamp, user_id, action, module, area, entity_type, \
     entity_id, old_values, new_values, ip_address, user_agent, request_id, metadata";

const SESSION_COLUMNS: &str =
    "session_token, user_id, expires, ip_address, user_agent, created_at, updated_at";

/// Store backed by a PostgreSQL connection pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store over an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> DatabaseResult<()> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        info!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn write_audit_entry<'e, E>(executor: E, entry: &AuditLogEntry) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, timestamp, user_id, action, module, area, entity_type,
                                entity_id, old_values, new_values, ip_address, user_agent,
                                request_id, metadata)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(entry.id)
    .bind(entry.timestamp)
    .bind(entry.user_id)
    .bind(&entry.action)
    .bind(&entry.module)
    .bind(&entry.area)
    .bind(&entry.entity_type)
    .bind(&entry.entity_id)
    .bind(&entry.old_values)
    .bind(&entry.new_values)
    .bind(&entry.ip_address)
    .bind(&entry.user_agent)
    .bind(&entry.request_id)
    .bind(&entry.metadata)
    .execute(executor)
    .await?;

    Ok(())
}

fn push_audit_filters(builder: &mut QueryBuilder<'_, Postgres>, filters: &AuditLogFilters) {
    builder.push(" WHERE TRUE");
    if let Some(user_id) = filters.user_id {
        builder.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(module) = &filters.module {
        builder.push(" AND module = ").push_bind(module.clone());
    }
    if let Some(action) = &filters.action {
        builder.push(" AND action = ").push_bind(action.clone());
    }
    if let Some(area) = filters.area {
        builder.push(" AND area = ").push_bind(area.as_str());
    }
    if let Some(entity_type) = &filters.entity_type {
        builder.push(" AND entity_type = ").push_bind(entity_type.clone());
    }
    if let Some(entity_id) = &filters.entity_id {
        builder.push(" AND entity_id = ").push_bind(entity_id.clone());
    }
    if let Some(request_id) = &filters.request_id {
        builder.push(" AND request_id = ").push_bind(request_id.clone());
    }
    if let Some(start) = filters.start_date {
        builder.push(" AND timestamp >= ").push_bind(start);
    }
    if let Some(end) = filters.end_date {
        builder.push(" AND timestamp <= ").push_bind(end);
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(
        &self,
        user: &User,
        credentials: Option<&Credentials>,
    ) -> DatabaseResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, first_name, last_name, email_verified_at,
                               image, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.email_verified_at)
        .bind(&user.image)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await?;

        if let Some(credentials) = credentials {
            sqlx::query(
                r#"
                INSERT INTO user_credentials (user_id, password_hash, updated_at)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(credentials.user_id)
            .bind(&credentials.password_hash)
            .bind(credentials.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_user_by_id(&self, id: Uuid) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, name, first_name, last_name, email_verified_at, image,
                   created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| User {
            id: row.get("id"),
            email: row.get("email"),
            name: row.get("name"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            email_verified_at: row.get("email_verified_at"),
            image: row.get("image"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    async fn find_user_by_email(&self, email: &str) -> DatabaseResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, first_name, last_name, email_verified_at, image,
                   created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn list_users(&self) -> DatabaseResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, first_name, last_name, email_verified_at, image,
                   created_at, updated_at
            FROM users
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn update_user(&self, user: &User) -> DatabaseResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET name = $2, first_name = $3, last_name = $4, image = $5,
                email_verified_at = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.image)
        .bind(user.email_verified_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("user {}", user.id)));
        }
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> DatabaseResult<bool> {
        // Dependent rows go through ON DELETE CASCADE, audit rows through SET NULL
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_credentials(&self, user_id: Uuid) -> DatabaseResult<Option<Credentials>> {
        let credentials = sqlx::query_as::<_, Credentials>(
            "SELECT user_id, password_hash, updated_at FROM user_credentials WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(credentials)
    }

    async fn replace_password_and_revoke_sessions(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> DatabaseResult<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO user_credentials (user_id, password_hash, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id) DO UPDATE SET
            password_hash = EXCLUDED.password_hash,
            updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&mut *tx)
        .await?;

        let revoked = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(revoked)
    }
}

#[async_trait]
impl RbacStore for PgStore {
    async fn list_permissions(&self) -> DatabaseResult<Vec<Permission>> {
        let permissions = sqlx::query_as::<_, Permission>(
            "SELECT id, module, description, created_at FROM permissions ORDER BY module, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(permissions)
    }

    async fn list_permissions_by_module(&self, module: &str) -> DatabaseResult<Vec<Permission>> {
        let permissions = sqlx::query_as::<_, Permission>(
            r#"
            SELECT id, module, description, created_at
            FROM permissions
            WHERE module = $1
            ORDER BY id
            "#,
        )
        .bind(module)
        .fetch_all(&self.pool)
        .await?;

        Ok(permissions)
    }

    async fn permission_exists(&self, id: &str) -> DatabaseResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM permissions WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    async fn upsert_permission(&self, permission: &Permission) -> DatabaseResult<()> {
        sqlx::query(
            r#"
            INSERT INTO permissions (id, module, description, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&permission.id)
        .bind(&permission.module)
        .bind(&permission.description)
        .bind(permission.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_role(&self, role: &Role) -> DatabaseResult<()> {
        sqlx::query(
            r#"
            INSERT INTO roles (id, name, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(role.id)
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.created_at)
        .bind(role.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_role_by_id(&self, id: Uuid) -> DatabaseResult<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(
            "SELECT id, name, description, created_at, updated_at FROM roles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(role)
    }

    async fn find_role_by_name(&self, name: &str) -> DatabaseResult<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(
            "SELECT id, name, description, created_at, updated_at FROM roles WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(role)
    }

    async fn list_roles(&self) -> DatabaseResult<Vec<Role>> {
        let roles = sqlx::query_as::<_, Role>(
            "SELECT id, name, description, created_at, updated_at FROM roles ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(roles)
    }

    async fn update_role(&self, role: &Role) -> DatabaseResult<()> {
        let result = sqlx::query(
            "UPDATE roles SET name = $2, description = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(role.id)
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("role {}", role.id)));
        }
        Ok(())
    }

    async fn delete_role(&self, id: Uuid) -> DatabaseResult<bool> {
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn role_permission_ids(&self, role_id: Uuid) -> DatabaseResult<BTreeSet<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT permission_id FROM role_permissions WHERE role_id = $1")
                .bind(role_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(ids.into_iter().collect())
    }

    async fn replace_role_permissions(
        &self,
        role_id: Uuid,
        permission_ids: &[String],
    ) -> DatabaseResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission_id)
            SELECT $1, UNNEST($2::text[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(role_id)
        .bind(permission_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn user_permission_ids(&self, user_id: Uuid) -> DatabaseResult<BTreeSet<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT rp.permission_id
            FROM user_roles ur
            JOIN role_permissions rp ON rp.role_id = ur.role_id
            WHERE ur.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().collect())
    }

    async fn user_has_permission(
        &self,
        user_id: Uuid,
        permission_id: &str,
    ) -> DatabaseResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1
                FROM user_roles ur
                JOIN role_permissions rp ON rp.role_id = ur.role_id
                WHERE ur.user_id = $1 AND rp.permission_id = $2
            )
            "#,
        )
        .bind(user_id)
        .bind(permission_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn user_has_any_permission(
        &self,
        user_id: Uuid,
        permission_ids: &[String],
    ) -> DatabaseResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1
                FROM user_roles ur
                JOIN role_permissions rp ON rp.role_id = ur.role_id
                WHERE ur.user_id = $1 AND rp.permission_id = ANY($2)
            )
            "#,
        )
        .bind(user_id)
        .bind(permission_ids)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn user_roles_with_permissions(
        &self,
        user_id: Uuid,
    ) -> DatabaseResult<Vec<RoleWithPermissions>> {
        let rows = sqlx::query(
            r#"
            SELECT r.id, r.name, r.description,
                   COALESCE(
                       ARRAY_AGG(rp.permission_id) FILTER (WHERE rp.permission_id IS NOT NULL),
                       '{}'
                   ) AS permissions
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            LEFT JOIN role_permissions rp ON rp.role_id = r.id
            WHERE ur.user_id = $1
            GROUP BY r.id, r.name, r.description
            ORDER BY r.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let roles = rows
            .into_iter()
            .map(|row| {
                let permissions: Vec<String> = row.get("permissions");
                RoleWithPermissions {
                    role_id: row.get("id"),
                    name: row.get("name"),
                    description: row.get("description"),
                    permissions: permissions.into_iter().collect(),
                }
            })
            .collect();

        Ok(roles)
    }

    async fn find_user_role(
        &self,
        user_id: Uuid,
        role_id: Uuid,
    ) -> DatabaseResult<Option<UserRole>> {
        let assignment = sqlx::query_as::<_, UserRole>(
            r#"
            SELECT user_id, role_id, created_at, created_by
            FROM user_roles
            WHERE user_id = $1 AND role_id = $2
            "#,
        )
        .bind(user_id)
        .bind(role_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(assignment)
    }

    async fn insert_user_role(
        &self,
        assignment: &UserRole,
        audit: &AuditLogEntry,
    ) -> DatabaseResult<()> {
        let mut tx = self.pool.begin().await?;

        // The primary key on (user_id, role_id) settles concurrent duplicates
        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id, created_at, created_by)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(assignment.user_id)
        .bind(assignment.role_id)
        .bind(assignment.created_at)
        .bind(assignment.created_by)
        .execute(&mut *tx)
        .await?;

        write_audit_entry(&mut *tx, audit).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete_user_role(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        audit: &AuditLogEntry,
    ) -> DatabaseResult<bool> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
            .bind(user_id)
            .bind(role_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        write_audit_entry(&mut *tx, audit).await?;

        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn insert_session(&self, session: &Session) -> DatabaseResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (session_token, user_id, expires, ip_address, user_agent,
                                  created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&session.session_token)
        .bind(session.user_id)
        .bind(session.expires)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_session(&self, session_token: &str) -> DatabaseResult<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {} FROM sessions WHERE session_token = $1",
            SESSION_COLUMNS
        ))
        .bind(session_token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    async fn session_is_valid(
        &self,
        session_token: &str,
        now: DateTime<Utc>,
    ) -> DatabaseResult<bool> {
        let valid: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sessions WHERE session_token = $1 AND expires > $2)",
        )
        .bind(session_token)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(valid)
    }

    async fn delete_session(&self, session_token: &str) -> DatabaseResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE session_token = $1")
            .bind(session_token)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_sessions_for_user(
        &self,
        user_id: Uuid,
        include_expired: bool,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Vec<Session>> {
        let sessions = sqlx::query_as::<_, Session>(&format!(
            r#"
            SELECT {}
            FROM sessions
            WHERE user_id = $1 AND ($2 OR expires > $3)
            ORDER BY created_at DESC
            "#,
            SESSION_COLUMNS
        ))
        .bind(user_id)
        .bind(include_expired)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    async fn delete_sessions_for_user_except(
        &self,
        user_id: Uuid,
        keep_token: &str,
    ) -> DatabaseResult<u64> {
        let result =
            sqlx::query("DELETE FROM sessions WHERE user_id = $1 AND session_token <> $2")
                .bind(user_id)
                .bind(keep_token)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> DatabaseResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> DatabaseResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn count_active_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> DatabaseResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE user_id = $1 AND expires > $2")
                .bind(user_id)
                .bind(now)
                .fetch_one(&self.pool)
                .await?;

        Ok(count as u64)
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn insert_audit_entry(&self, entry: &AuditLogEntry) -> DatabaseResult<()> {
        write_audit_entry(&self.pool, entry).await?;
        Ok(())
    }

    async fn query_audit_entries(
        &self,
        filters: &AuditLogFilters,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<(Vec<AuditLogEntry>, i64)> {
        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM audit_logs",
            AUDIT_COLUMNS
        ));
        push_audit_filters(&mut select, filters);
        select
            .push(" ORDER BY timestamp DESC, id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let entries = select
            .build_query_as::<AuditLogEntry>()
            .fetch_all(&self.pool)
            .await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_logs");
        push_audit_filters(&mut count, filters);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        Ok((entries, total))
    }
}

#[async_trait]
impl MenuStore for PgStore {
    async fn list_menu_items(&self) -> DatabaseResult<Vec<MenuItem>> {
        let items = sqlx::query_as::<_, MenuItem>(
            r#"
            SELECT id, label, href, icon, permission_id, is_active, sort_order, parent_id
            FROM menu_items
            ORDER BY sort_order, created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    async fn insert_menu_item(&self, item: &MenuItem) -> DatabaseResult<()> {
        sqlx::query(
            r#"
            INSERT INTO menu_items (id, label, href, icon, permission_id, is_active,
                                    sort_order, parent_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(item.id)
        .bind(&item.label)
        .bind(&item.href)
        .bind(&item.icon)
        .bind(&item.permission_id)
        .bind(item.is_active)
        .bind(item.order)
        .bind(item.parent_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl PasswordResetStore for PgStore {
    async fn replace_reset_token(&self, token: &PasswordResetToken) -> DatabaseResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM password_reset_tokens WHERE user_id = $1")
            .bind(token.user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO password_reset_tokens (id, user_id, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(token.id)
        .bind(token.user_id)
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .bind(token.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_reset_token_by_hash(
        &self,
        token_hash: &str,
    ) -> DatabaseResult<Option<PasswordResetToken>> {
        let token = sqlx::query_as::<_, PasswordResetToken>(
            r#"
            SELECT id, user_id, token_hash, expires_at, created_at
            FROM password_reset_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    async fn delete_reset_token(&self, id: Uuid) -> DatabaseResult<bool> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn complete_password_reset(
        &self,
        token_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Option<(Uuid, u64)>> {
        let mut tx = self.pool.begin().await?;

        let consumed: Option<Uuid> = sqlx::query_scalar(
            r#"
            DELETE FROM password_reset_tokens
            WHERE id = $1 AND expires_at >= $2
            RETURNING user_id
            "#,
        )
        .bind(token_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(user_id) = consumed else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            r#"
            INSERT INTO user_credentials (user_id, password_hash, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id) DO UPDATE SET
            password_hash = EXCLUDED.password_hash,
            updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&mut *tx)
        .await?;

        let revoked = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM password_reset_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some((user_id, revoked)))
    }

    async fn delete_expired_reset_tokens(&self, now: DateTime<Utc>) -> DatabaseResult<u64> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
