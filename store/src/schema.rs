pub const OPERATIONAL_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sites (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    url                 TEXT NOT NULL UNIQUE,
    name                TEXT NOT NULL,
    ping_interval       INTEGER NOT NULL DEFAULT 30,
    com                 TEXT NOT NULL DEFAULT '{}',
    last_traffic_light  TEXT,
    history             TEXT NOT NULL DEFAULT '[]',
    last_ok             INTEGER,
    last_status         INTEGER,
    last_rtt            REAL
);

CREATE TABLE IF NOT EXISTS teams (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    name                TEXT NOT NULL UNIQUE,
    description         TEXT,
    tracked_site_ids    TEXT NOT NULL DEFAULT '[]',
    tg_chat_id          INTEGER,
    email_recipients    TEXT NOT NULL DEFAULT '[]',
    webhook_urls        TEXT NOT NULL DEFAULT '[]',
    created_at          INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    tg_user_id          INTEGER NOT NULL UNIQUE,
    tg_chat_id          INTEGER,
    login               TEXT,
    enabled             INTEGER NOT NULL DEFAULT 1,
    created_at          INTEGER NOT NULL,
    updated_at          INTEGER NOT NULL
);
"#;

pub const ANALYTICS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS site_logs (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id             INTEGER NOT NULL,
    url                 TEXT NOT NULL,
    name                TEXT NOT NULL,
    timestamp           TEXT NOT NULL,
    traffic_light       TEXT NOT NULL,
    http_status         INTEGER,
    latency_ms          INTEGER,
    ping_ms             REAL,
    ssl_days_left       INTEGER,
    dns_resolved        INTEGER NOT NULL,
    redirects           INTEGER,
    errors_last         INTEGER,
    ping_interval       INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_site_logs_url_ts ON site_logs (url, timestamp);
"#;
