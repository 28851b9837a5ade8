use std::borrow::Cow;

use crate::config::{SQL_SERVER_DOMAIN_SUFFIX, SQL_SERVER_PORT};

pub const DEFAULT_DRIVER: &str = "{ODBC Driver 17 for SQL Server}";

/// `{server}.database.windows.net,1433`
pub fn server_host(server: &str) -> String {
    format!("{server}.{SQL_SERVER_DOMAIN_SUFFIX},{SQL_SERVER_PORT}")
}

/// ODBC connection string for an Azure SQL database.
///
/// One `key=value;` pair per line, with a leading and a trailing newline.
/// `server` is the short server name; the host and port are appended here.
/// Encryption is always required and the server certificate is always
/// validated.
pub fn connection_string(
    driver: Option<&str>,
    server: &str,
    database: &str,
    username: &str,
    password: &str,
) -> String {
    let driver = driver.unwrap_or(DEFAULT_DRIVER);
    let host = server_host(server);
    let database = attribute_value(database);
    let username = attribute_value(username);
    let password = attribute_value(password);
    format!(
        "\nDriver={driver};\nServer={host};\nDatabase={database};\nUid={username};\nPwd={password};\n\
         Encrypt=yes;\nTrustServerCertificate=no;\nConnection Timeout=30;\n"
    )
}

/// Brace-quote values the driver manager would otherwise split or trim.
fn attribute_value(value: &str) -> Cow<'_, str> {
    let needs_quoting = value.contains([';', '{', '}'])
        || value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace);
    if needs_quoting {
        Cow::Owned(format!("{{{}}}", value.replace('}', "}}")))
    } else {
        Cow::Borrowed(value)
    }
}
