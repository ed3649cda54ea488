//! sqlplus backend implementation.
//!
//! Drives one long-lived `sqlplus` session with generated PL/SQL blocks
//! against the DBMS_RESOURCE_MANAGER package and lockdown-profile DDL.
//! The session must be long-lived because pending-area state is
//! session-scoped: open, stage, validate, and submit have to land on the
//! same database session.
//!
//! Every call has a configurable timeout. A timed-out call kills the
//! session (its state is unknown at that point) and maps to
//! `Unavailable`; the caller decides whether that is retryable.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::OnceLock;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;

use crate::backend::{ActivePlanControl, LockdownCatalog, PendingArea, PlanCatalog};
use crate::error::{Error, Result};
use crate::types::{DirectiveRow, LockdownRule, PlanInfo};
use policy::{AutotaskDirective, Directive};

/// Marker emitted after every statement so the reader knows where one
/// call's output ends.
const END_MARKER: &str = "TIERCTL_DONE";

/// Connection settings for the sqlplus backend.
#[derive(Debug, Clone)]
pub struct SqlplusConfig {
    /// Path to the sqlplus binary
    pub binary: PathBuf,
    /// Connect string, e.g. `/ as sysdba` or `admin@cdb1`
    pub connect: String,
    /// Timeout applied to every external call
    pub call_timeout: Duration,
}

impl Default for SqlplusConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("sqlplus"),
            connect: "/ as sysdba".to_string(),
            call_timeout: Duration::from_secs(60),
        }
    }
}

/// Backend driving a single long-lived sqlplus session.
#[derive(Debug)]
pub struct SqlplusBackend {
    config: SqlplusConfig,
    child: Child,
    stdin: ChildStdin,
    lines: mpsc::Receiver<String>,
}

impl SqlplusBackend {
    /// Start a sqlplus session and verify it answers.
    ///
    /// Returns `SqlplusNotFound` if the binary cannot be spawned and a
    /// classified error (`Permission`, `Unavailable`, ...) if the logon
    /// fails.
    pub fn connect(config: SqlplusConfig) -> Result<Self> {
        let mut child = Command::new(&config.binary)
            .arg("-S")
            .arg("-L")
            .arg(&config.connect)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::SqlplusNotFound
                } else {
                    Error::Io(e)
                }
            })?;

        let mut stdin = child.stdin.take().expect("stdin piped");
        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");

        // One channel for both streams; the reader threads exit when the
        // session closes.
        let (tx, lines) = mpsc::channel();
        let tx_err = tx.clone();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines().map_while(|l| l.ok()) {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        thread::spawn(move || {
            let mut buf = String::new();
            if BufReader::new(stderr).read_to_string(&mut buf).is_ok() {
                for line in buf.lines() {
                    let _ = tx_err.send(line.to_string());
                }
            }
        });

        // Quiet, parseable output for the whole session. Write errors are
        // ignored here: if the logon already failed the next run() call
        // classifies the ORA lines instead of surfacing a broken pipe.
        let _ = writeln!(
            stdin,
            "SET FEEDBACK OFF\nSET HEADING OFF\nSET PAGESIZE 0\nSET LINESIZE 4000\nSET SQLPROMPT ''"
        );

        let mut backend = Self {
            config,
            child,
            stdin,
            lines,
        };
        // Verify the session is alive; a failed logon surfaces here
        backend.run("connect", "SELECT 1 FROM dual;")?;
        Ok(backend)
    }

    /// Send one statement (SQL or a complete PL/SQL block ending in `/`)
    /// and collect its output up to the end marker.
    fn run(&mut self, call: &str, statement: &str) -> Result<String> {
        let written = writeln!(self.stdin, "{statement}")
            .and_then(|()| writeln!(self.stdin, "PROMPT {END_MARKER}"))
            .and_then(|()| self.stdin.flush());
        if let Err(e) = written {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                // Session died; drain whatever it said and classify that
                let mut output = String::new();
                while let Ok(line) = self.lines.recv_timeout(Duration::from_millis(200)) {
                    output.push_str(&line);
                    output.push('\n');
                }
                return Err(session_closed(call, &output));
            }
            return Err(Error::Io(e));
        }

        let mut output = String::new();
        let deadline = Instant::now() + self.config.call_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                // Session state is unknown after a timeout; kill it so
                // later calls fail fast instead of reading stale output.
                let _ = self.child.kill();
                return Err(Error::Unavailable {
                    message: format!(
                        "{call} timed out after {}s",
                        self.config.call_timeout.as_secs()
                    ),
                });
            }
            match self
                .lines
                .recv_timeout(remaining.min(Duration::from_millis(200)))
            {
                Ok(line) if line.trim() == END_MARKER => break,
                Ok(line) => {
                    output.push_str(&line);
                    output.push('\n');
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if let Ok(Some(_)) = self.child.try_wait() {
                        return Err(session_closed(call, &output));
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(session_closed(call, &output));
                }
            }
        }

        if output.contains("ORA-") || output.contains("SP2-") {
            return Err(Error::from_sqlplus_output(call, &output));
        }
        Ok(output)
    }

    fn run_plsql(&mut self, call: &str, body: &str) -> Result<()> {
        let block = format!("BEGIN\n  {body}\nEND;\n/");
        self.run(call, &block).map(|_| ())
    }

    fn query_rows(&mut self, call: &str, sql: &str) -> Result<Vec<String>> {
        let output = self.run(call, sql)?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }
}

impl Drop for SqlplusBackend {
    fn drop(&mut self) {
        let _ = writeln!(self.stdin, "EXIT");
        let _ = self.stdin.flush();
        // Give the session a moment to exit cleanly, then reap it
        thread::sleep(Duration::from_millis(100));
        if matches!(self.child.try_wait(), Ok(None)) {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

/// The session died mid-call. Classify collected output if there is any.
fn session_closed(call: &str, output: &str) -> Error {
    if output.contains("ORA-") || output.contains("SP2-") {
        Error::from_sqlplus_output(call, output)
    } else {
        Error::Unavailable {
            message: format!("{call}: sqlplus session closed: {}", output.trim()),
        }
    }
}

// ============================================================================
// Statement generation helpers
// ============================================================================

/// Escape a string literal for embedding in SQL.
fn q(s: &str) -> String {
    s.replace('\'', "''")
}

static IDENT: OnceLock<Regex> = OnceLock::new();

/// Validate a name used as a bare identifier; lockdown profile DDL cannot
/// take it as a string literal.
fn ident(name: &str) -> Result<&str> {
    let re =
        IDENT.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_$#]*$").expect("static pattern"));
    if re.is_match(name) {
        Ok(name)
    } else {
        Err(Error::CommandFailed {
            call: "identifier check".to_string(),
            message: format!("not a valid identifier: {name}"),
        })
    }
}

fn already_exists(err: &Error) -> bool {
    match err {
        Error::DirectiveExists { .. } | Error::ProfileExists { .. } => true,
        // ORA-29357: object already exists; ORA-29364: plan directive
        // already exists. Neither code has a dedicated classification.
        Error::CommandFailed { message, .. } => {
            message.contains("ORA-29357")
                || message.contains("ORA-29364")
                || message.to_ascii_lowercase().contains("already exists")
        }
        _ => false,
    }
}

fn parse_plan_row(line: &str) -> Option<PlanInfo> {
    let mut parts = line.splitn(3, '|');
    let name = parts.next()?.trim().to_string();
    if name.is_empty() {
        return None;
    }
    let status = parts.next()?.trim();
    let comment = parts.next().unwrap_or("").trim().to_string();
    Some(PlanInfo {
        name,
        status: if status.is_empty() {
            None
        } else {
            Some(status.to_string())
        },
        comment,
    })
}

fn parse_directive_row(plan: &str, line: &str) -> Option<DirectiveRow> {
    let mut parts = line.splitn(4, '|');
    let profile = parts.next()?.trim().to_string();
    if profile.is_empty() {
        return None;
    }
    let shares = parts.next()?.trim().parse().ok()?;
    let utilization_limit = parts.next()?.trim().parse().ok()?;
    let psl = parts.next().unwrap_or("").trim();
    Some(DirectiveRow {
        plan: plan.to_string(),
        profile,
        shares,
        utilization_limit,
        parallel_server_limit: if psl.is_empty() { None } else { psl.parse().ok() },
    })
}

fn parse_rule_row(line: &str) -> Option<LockdownRule> {
    let mut parts = line.splitn(2, '|');
    let operation = parts.next()?.trim().to_string();
    let option = parts.next()?.trim();
    // Profiles may carry rules outside the managed parameter set
    let parameter = option.parse().ok()?;
    Some(LockdownRule {
        parameter,
        operation,
    })
}

// ============================================================================
// Capability implementations
// ============================================================================

impl PendingArea for SqlplusBackend {
    fn open_pending_area(&mut self) -> Result<()> {
        self.run_plsql(
            "open_pending_area",
            "DBMS_RESOURCE_MANAGER.CREATE_PENDING_AREA();",
        )
    }

    fn clear_pending_area(&mut self) -> Result<()> {
        self.run_plsql(
            "clear_pending_area",
            "DBMS_RESOURCE_MANAGER.CLEAR_PENDING_AREA();",
        )
    }

    fn validate_pending_area(&mut self) -> Result<()> {
        self.run_plsql(
            "validate_pending_area",
            "DBMS_RESOURCE_MANAGER.VALIDATE_PENDING_AREA();",
        )
    }

    fn submit_pending_area(&mut self) -> Result<()> {
        self.run_plsql(
            "submit_pending_area",
            "DBMS_RESOURCE_MANAGER.SUBMIT_PENDING_AREA();",
        )
    }
}

impl PlanCatalog for SqlplusBackend {
    fn create_plan(&mut self, plan: &str, comment: &str) -> Result<()> {
        let create = format!(
            "DBMS_RESOURCE_MANAGER.CREATE_CDB_PLAN(plan => '{}', comment => '{}');",
            q(plan),
            q(comment)
        );
        match self.run_plsql(&format!("create_plan {plan}"), &create) {
            Ok(()) => Ok(()),
            Err(e) if already_exists(&e) => {
                let update = format!(
                    "DBMS_RESOURCE_MANAGER.UPDATE_CDB_PLAN(plan => '{}', new_comment => '{}');",
                    q(plan),
                    q(comment)
                );
                self.run_plsql(&format!("update_plan {plan}"), &update)
            }
            Err(e) => Err(e),
        }
    }

    fn upsert_profile_directive(
        &mut self,
        plan: &str,
        profile: &str,
        directive: &Directive,
    ) -> Result<()> {
        let create = format!(
            "DBMS_RESOURCE_MANAGER.CREATE_CDB_PROFILE_DIRECTIVE(\n    \
             plan => '{}',\n    \
             profile => '{}',\n    \
             shares => {},\n    \
             utilization_limit => {},\n    \
             parallel_server_limit => {});",
            q(plan),
            q(profile),
            directive.shares,
            directive.utilization_limit,
            directive.parallel_server_limit
        );
        match self.run_plsql(&format!("create_directive {plan}/{profile}"), &create) {
            Ok(()) => Ok(()),
            Err(e) if already_exists(&e) => {
                let update = format!(
                    "DBMS_RESOURCE_MANAGER.UPDATE_CDB_PROFILE_DIRECTIVE(\n    \
                     plan => '{}',\n    \
                     profile => '{}',\n    \
                     new_shares => {},\n    \
                     new_utilization_limit => {},\n    \
                     new_parallel_server_limit => {});",
                    q(plan),
                    q(profile),
                    directive.shares,
                    directive.utilization_limit,
                    directive.parallel_server_limit
                );
                self.run_plsql(&format!("update_directive {plan}/{profile}"), &update)
            }
            Err(e) => Err(e),
        }
    }

    fn update_default_directive(&mut self, plan: &str, directive: &Directive) -> Result<()> {
        let body = format!(
            "DBMS_RESOURCE_MANAGER.UPDATE_CDB_DEFAULT_DIRECTIVE(\n    \
             plan => '{}',\n    \
             new_shares => {},\n    \
             new_utilization_limit => {},\n    \
             new_parallel_server_limit => {});",
            q(plan),
            directive.shares,
            directive.utilization_limit,
            directive.parallel_server_limit
        );
        self.run_plsql(&format!("update_default_directive {plan}"), &body)
    }

    fn update_autotask_directive(
        &mut self,
        plan: &str,
        directive: &AutotaskDirective,
    ) -> Result<()> {
        let body = format!(
            "DBMS_RESOURCE_MANAGER.UPDATE_CDB_AUTOTASK_DIRECTIVE(\n    \
             plan => '{}',\n    \
             new_shares => {},\n    \
             new_utilization_limit => {});",
            q(plan),
            directive.shares,
            directive.utilization_limit
        );
        self.run_plsql(&format!("update_autotask_directive {plan}"), &body)
    }

    fn list_plans(&mut self) -> Result<Vec<PlanInfo>> {
        let sql = "SELECT plan || '|' || NVL(status, ' ') || '|' || NVL(comments, ' ') \
                   FROM dba_cdb_rsrc_plans ORDER BY plan;";
        let rows = self.query_rows("list_plans", sql)?;
        Ok(rows.iter().filter_map(|l| parse_plan_row(l)).collect())
    }

    fn plan_directives(&mut self, plan: &str) -> Result<Vec<DirectiveRow>> {
        let sql = format!(
            "SELECT profile || '|' || shares || '|' || NVL(utilization_limit, 0) \
             || '|' || NVL(TO_CHAR(parallel_server_limit), ' ') \
             FROM dba_cdb_rsrc_plan_directives \
             WHERE UPPER(plan) = UPPER('{}') ORDER BY profile;",
            q(plan)
        );
        let rows = self.query_rows(&format!("plan_directives {plan}"), &sql)?;
        Ok(rows
            .iter()
            .filter_map(|l| parse_directive_row(plan, l))
            .collect())
    }
}

impl ActivePlanControl for SqlplusBackend {
    fn set_active_plan(&mut self, plan: &str) -> Result<()> {
        let sql = format!(
            "ALTER SYSTEM SET RESOURCE_MANAGER_PLAN = '{}' SCOPE=BOTH;",
            q(plan)
        );
        self.run(&format!("set_active_plan {plan}"), &sql).map(|_| ())
    }

    fn active_plan(&mut self) -> Result<Option<String>> {
        let sql =
            "SELECT NVL(value, ' ') FROM v$parameter WHERE name = 'resource_manager_plan';";
        let rows = self.query_rows("active_plan", sql)?;
        Ok(rows
            .first()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()))
    }
}

impl LockdownCatalog for SqlplusBackend {
    fn create_profile(&mut self, profile: &str) -> Result<()> {
        if self.profile_exists(profile)? {
            return Err(Error::ProfileExists {
                profile: profile.to_string(),
            });
        }
        let sql = format!("CREATE LOCKDOWN PROFILE {};", ident(profile)?);
        self.run(&format!("create_profile {profile}"), &sql)
            .map(|_| ())
    }

    fn drop_profile(&mut self, profile: &str) -> Result<()> {
        let sql = format!("DROP LOCKDOWN PROFILE {};", ident(profile)?);
        self.run(&format!("drop_profile {profile}"), &sql).map(|_| ())
    }

    fn profile_exists(&mut self, profile: &str) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(DISTINCT profile_name) FROM dba_lockdown_profiles \
             WHERE profile_name = UPPER('{}');",
            q(profile)
        );
        let rows = self.query_rows(&format!("profile_exists {profile}"), &sql)?;
        let count: u32 = rows
            .first()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);
        Ok(count > 0)
    }

    fn add_rule(&mut self, profile: &str, rule: &LockdownRule) -> Result<()> {
        // The database silently accepts re-added rules; the duplicate
        // contract is enforced here so callers must opt into replace.
        let existing = self.profile_rules(profile)?;
        if existing.iter().any(|r| r.parameter == rule.parameter) {
            return Err(Error::DuplicateRule {
                profile: profile.to_string(),
                parameter: rule.parameter.to_string(),
            });
        }
        let sql = format!(
            "ALTER LOCKDOWN PROFILE {} DISABLE STATEMENT = ('{}') \
             CLAUSE = ('SET') OPTION = ('{}');",
            ident(profile)?,
            q(&rule.operation),
            rule.parameter.as_str()
        );
        self.run(
            &format!("add_rule {profile}/{}", rule.parameter),
            &sql,
        )
        .map(|_| ())
    }

    fn profile_rules(&mut self, profile: &str) -> Result<Vec<LockdownRule>> {
        if !self.profile_exists(profile)? {
            return Err(Error::MissingProfile {
                profile: profile.to_string(),
            });
        }
        let sql = format!(
            "SELECT rule || '|' || NVL(clause_option, ' ') FROM dba_lockdown_profiles \
             WHERE profile_name = UPPER('{}') AND rule_type = 'STATEMENT' \
             ORDER BY clause_option;",
            q(profile)
        );
        let rows = self.query_rows(&format!("profile_rules {profile}"), &sql)?;
        Ok(rows.iter().filter_map(|l| parse_rule_row(l)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy::LockedParameter;

    #[test]
    fn test_quote_escaping() {
        assert_eq!(q("newcdb_plan"), "newcdb_plan");
        assert_eq!(q("it's"), "it''s");
    }

    #[test]
    fn test_ident_accepts_catalog_names() {
        assert!(ident("gold_profile").is_ok());
        assert!(ident("ORA$DEFAULT_PDB_DIRECTIVE").is_ok());
        assert!(ident("p1").is_ok());
    }

    #[test]
    fn test_ident_rejects_injection() {
        assert!(ident("x; DROP TABLE t").is_err());
        assert!(ident("a b").is_err());
        assert!(ident("").is_err());
    }

    #[test]
    fn test_parse_plan_row() {
        let info = parse_plan_row("newcdb_plan|PENDING|Tiered CDB plan").unwrap();
        assert_eq!(info.name, "newcdb_plan");
        assert_eq!(info.status.as_deref(), Some("PENDING"));
        assert_eq!(info.comment, "Tiered CDB plan");

        let info = parse_plan_row("newcdb_plan| |Tiered CDB plan").unwrap();
        assert_eq!(info.status, None);

        assert!(parse_plan_row("").is_none());
    }

    #[test]
    fn test_parse_directive_row() {
        let row = parse_directive_row("newcdb_plan", "gold|3|60|60").unwrap();
        assert_eq!(row.plan, "newcdb_plan");
        assert_eq!(row.profile, "gold");
        assert_eq!(row.shares, 3);
        assert_eq!(row.utilization_limit, 60);
        assert_eq!(row.parallel_server_limit, Some(60));

        // Autotask rows carry no parallel-server limit
        let row = parse_directive_row("newcdb_plan", "ORA$AUTOTASK|2|60| ").unwrap();
        assert_eq!(row.parallel_server_limit, None);

        assert!(parse_directive_row("p", "gold|x|60|60").is_none());
    }

    #[test]
    fn test_parse_rule_row() {
        let rule = parse_rule_row("ALTER SYSTEM|MAX_IOPS").unwrap();
        assert_eq!(rule.parameter, LockedParameter::MaxIops);
        assert_eq!(rule.operation, "ALTER SYSTEM");

        // Rules outside the managed set are skipped
        assert!(parse_rule_row("ALTER SYSTEM|CPU_COUNT").is_none());
    }

    #[test]
    fn test_already_exists_detection() {
        let err = Error::CommandFailed {
            call: "create_plan p1".into(),
            message: "ORA-29357: object p1 already exists".into(),
        };
        assert!(already_exists(&err));

        let err = Error::CommandFailed {
            call: "create_directive p1/gold".into(),
            message: "ORA-29364: plan directive p1, gold already exists".into(),
        };
        assert!(already_exists(&err));

        let err = Error::Unavailable {
            message: "timed out".into(),
        };
        assert!(!already_exists(&err));
    }

    #[test]
    fn test_connect_missing_binary() {
        let config = SqlplusConfig {
            binary: PathBuf::from("/nonexistent/sqlplus"),
            ..Default::default()
        };
        let err = SqlplusBackend::connect(config).unwrap_err();
        assert!(matches!(err, Error::SqlplusNotFound));
    }
}
