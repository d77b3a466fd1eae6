//! MariaDB/MySQL client invocations.
//!
//! Passwords travel in the `MYSQL_PWD` environment variable, never on the
//! command line, and SQL is fed on stdin.

use super::{CommandOutput, CommandRunner, CommandSpec, Stdin};
use crate::config::ProvisionConfig;
use crate::context::DbLogin;
use crate::errors::ProvisionError;
use std::path::Path;

/// Database server access for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Database {
    client: String,
    dump: String,
    host: String,
}

impl Database {
    /// Builds the client settings from configuration.
    #[must_use]
    pub fn from_config(config: &ProvisionConfig) -> Self {
        Self {
            client: config.database.client.clone(),
            dump: config.database.dump.clone(),
            host: config.database.host.clone(),
        }
    }

    fn login_args(&self, program: &str, login: &DbLogin) -> CommandSpec {
        CommandSpec::new(program)
            .arg(format!("--host={}", self.host))
            .arg(format!("--user={}", login.user))
            .env("MYSQL_PWD", login.password.expose())
    }

    /// A client invocation that executes `sql` in batch mode.
    #[must_use]
    pub fn sql(&self, login: &DbLogin, sql: &str) -> CommandSpec {
        self.login_args(&self.client, login)
            .args(["--batch", "--skip-column-names"])
            .stdin(Stdin::Text(sql.to_string()))
    }

    /// Runs `sql`, returning stdout.
    ///
    /// A rejected login becomes [`ProvisionError::Authentication`].
    pub async fn execute(
        &self,
        runner: &dyn CommandRunner,
        login: &DbLogin,
        sql: &str,
    ) -> Result<String, ProvisionError> {
        let command = self.sql(login, sql);
        let output = runner.run(&command).await?;
        check(&command, login, &output)?;
        Ok(output.stdout)
    }

    /// Checks that `login` is accepted by the server.
    pub async fn verify(
        &self,
        runner: &dyn CommandRunner,
        login: &DbLogin,
    ) -> Result<(), ProvisionError> {
        self.execute(runner, login, "SELECT 1;").await.map(drop)
    }

    /// Returns true if database `name` exists.
    pub async fn database_exists(
        &self,
        runner: &dyn CommandRunner,
        login: &DbLogin,
        name: &str,
    ) -> Result<bool, ProvisionError> {
        let out = self
            .execute(
                runner,
                login,
                &format!(
                    "SELECT SCHEMA_NAME FROM INFORMATION_SCHEMA.SCHEMATA WHERE SCHEMA_NAME = '{}';",
                    quote(name)
                ),
            )
            .await?;
        Ok(out.lines().any(|l| l.trim() == name))
    }

    /// Dumps database `name` into `file`.
    #[must_use]
    pub fn dump_command(&self, login: &DbLogin, name: &str, file: &Path) -> CommandSpec {
        self.login_args(&self.dump, login)
            .args(["--single-transaction", "--routines"])
            .arg(format!("--result-file={}", file.display()))
            .arg(name)
    }

    /// Imports `file` into database `name`.
    #[must_use]
    pub fn import_command(&self, login: &DbLogin, name: &str, file: &Path) -> CommandSpec {
        self.login_args(&self.client, login)
            .arg(name)
            .stdin(Stdin::File(file.to_path_buf()))
    }

    /// Runs a prepared command and applies the login error mapping.
    pub async fn run(
        &self,
        runner: &dyn CommandRunner,
        login: &DbLogin,
        command: &CommandSpec,
    ) -> Result<CommandOutput, ProvisionError> {
        let output = runner.run(command).await?;
        check(command, login, &output)?;
        Ok(output)
    }
}

fn check(
    command: &CommandSpec,
    login: &DbLogin,
    output: &CommandOutput,
) -> Result<(), ProvisionError> {
    if output.is_success() {
        return Ok(());
    }
    let combined = output.combined();
    if combined.contains("Access denied") {
        let reason = combined.lines().next().unwrap_or("access denied").to_string();
        return Err(ProvisionError::authentication(login.user.clone(), reason));
    }
    Err(ProvisionError::command_failed(command.to_string(), output.exit_code, combined))
}

/// Escapes a value for use inside a single-quoted SQL string.
#[must_use]
pub fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Statements creating database `name` and account `user` with full rights
/// on it. A leftover account is reused with the new password.
#[must_use]
pub fn create_statements(name: &str, user: &str, password: &str) -> String {
    format!(
        "CREATE DATABASE `{name}` CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci;\n\
         CREATE USER IF NOT EXISTS '{user}'@'localhost' IDENTIFIED BY '{password}';\n\
         ALTER USER '{user}'@'localhost' IDENTIFIED BY '{password}';\n\
         GRANT ALL PRIVILEGES ON `{name}`.* TO '{user}'@'localhost';\n\
         FLUSH PRIVILEGES;\n",
        user = quote(user),
        password = quote(password),
    )
}

/// Statements dropping database `name` and account `user` if present.
#[must_use]
pub fn drop_statements(name: &str, user: &str) -> String {
    format!(
        "DROP DATABASE IF EXISTS `{name}`;\n\
         DROP USER IF EXISTS '{user}'@'localhost';\n\
         FLUSH PRIVILEGES;\n",
        user = quote(user),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::MockCommandRunner;
    use pretty_assertions::assert_eq;

    fn root() -> DbLogin {
        DbLogin::new("root", "s3cret")
    }

    #[test]
    fn test_password_stays_off_command_line() {
        let db = Database::from_config(&ProvisionConfig::default());
        let cmd = db.sql(&root(), "SELECT 1;");
        assert_eq!(
            cmd.to_string(),
            "mariadb --host=localhost --user=root --batch --skip-column-names"
        );
        assert_eq!(cmd.env, vec![("MYSQL_PWD".to_string(), "s3cret".to_string())]);
        assert_eq!(cmd.stdin, Stdin::Text("SELECT 1;".into()));
    }

    #[test]
    fn test_statements() {
        let sql = create_statements("wp_blog", "wp_blog", "pa'ss");
        assert!(sql.contains("CREATE DATABASE `wp_blog`"));
        assert!(sql.contains("CREATE USER IF NOT EXISTS 'wp_blog'@'localhost'"));
        assert!(sql.contains("ALTER USER 'wp_blog'@'localhost' IDENTIFIED BY 'pa\\'ss'"));
        assert!(sql.contains("IDENTIFIED BY 'pa\\'ss'"));
        let drop = drop_statements("wp_blog", "wp_blog");
        assert!(drop.contains("DROP DATABASE IF EXISTS `wp_blog`"));
    }

    #[tokio::test]
    async fn test_access_denied_is_authentication() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|_| {
            Ok(CommandOutput::failure(
                1,
                "ERROR 1045 (28000): Access denied for user 'root'@'localhost' (using password: YES)",
            ))
        });
        let db = Database::from_config(&ProvisionConfig::default());
        let err = db.verify(&runner, &root()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Authentication { .. }));
        assert_eq!(err.exit_code(), 4);
    }

    #[tokio::test]
    async fn test_other_failure_is_command_error() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|_| {
            Ok(CommandOutput::failure(1, "ERROR 2002 (HY000): Can't connect to local server"))
        });
        let db = Database::from_config(&ProvisionConfig::default());
        let err = db.verify(&runner, &root()).await.unwrap_err();
        assert_eq!(err.exit_code(), 5);
    }

    #[tokio::test]
    async fn test_database_exists() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_| Ok(CommandOutput::success("wp_blog\n")));
        let db = Database::from_config(&ProvisionConfig::default());
        assert!(db.database_exists(&runner, &root(), "wp_blog").await.unwrap());
    }

    #[test]
    fn test_dump_and_import_commands() {
        let db = Database::from_config(&ProvisionConfig::default());
        let dump = db.dump_command(&root(), "wp_blog", Path::new("/b/database.sql"));
        assert!(dump.to_string().starts_with("mariadb-dump --host=localhost --user=root"));
        assert!(dump.mentions("--result-file=/b/database.sql"));

        let import = db.import_command(&root(), "wp_blog", Path::new("/b/database.sql"));
        assert_eq!(import.stdin, Stdin::File("/b/database.sql".into()));
    }
}
