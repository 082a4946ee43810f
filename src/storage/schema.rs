use super::{StorageError, TursoClient};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT,
    google_id TEXT UNIQUE,
    first_name TEXT NOT NULL DEFAULT '',
    last_name TEXT NOT NULL DEFAULT '',
    is_verified INTEGER NOT NULL DEFAULT 0,
    stripe_customer_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS products (
    id TEXT PRIMARY KEY,
    template_id TEXT NOT NULL,
    name TEXT NOT NULL,
    tier TEXT NOT NULL,
    trial_days INTEGER NOT NULL DEFAULT 0,
    subscription_types TEXT NOT NULL DEFAULT '{}',
    stripe_prices TEXT NOT NULL DEFAULT '{}',
    product_license_template TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_subscriptions (
    user_id TEXT PRIMARY KEY REFERENCES users(id),
    subscriptions TEXT NOT NULL DEFAULT '[]',
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS payments (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id),
    product_id TEXT,
    stripe_event_id TEXT UNIQUE,
    stripe_subscription_id TEXT,
    amount_cents INTEGER NOT NULL DEFAULT 0,
    currency TEXT NOT NULL DEFAULT 'usd',
    status TEXT NOT NULL,
    event_type TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_payments_user ON payments(user_id);

CREATE TABLE IF NOT EXISTS courses (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    required_tier TEXT NOT NULL DEFAULT 'basic',
    sort_order INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS lessons (
    id TEXT PRIMARY KEY,
    course_id TEXT NOT NULL REFERENCES courses(id),
    title TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    video_url TEXT,
    sort_order INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS software_downloads (
    id TEXT PRIMARY KEY,
    product_id TEXT REFERENCES products(id),
    name TEXT NOT NULL,
    file_name TEXT NOT NULL,
    drive_file_id TEXT NOT NULL,
    required_tier TEXT NOT NULL DEFAULT 'basic',
    version TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS trading_rooms (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    zoom_meeting_id TEXT NOT NULL,
    required_tier TEXT NOT NULL DEFAULT 'premium'
);
"#;

pub async fn migrate(client: &TursoClient) -> Result<(), StorageError> {
    info!("Applying database schema");
    client.get_connection().execute_batch(SCHEMA).await?;
    Ok(())
}
