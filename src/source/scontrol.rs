//! Slurm command-line source.
//!
//! Lists identities with `sinfo`/`squeue` and fetches details with
//! `scontrol show <kind> <id> --oneliner`, translating Slurm's `Key=Value`
//! output into the snake_case attribute names used by the category tables.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use super::{ClusterSource, SourceError};
use crate::core::record::RawAttributes;
use crate::core::types::{EntityKind, Identity};

/// Default timeout for a single Slurm command.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Attributes whose values are comma-separated lists.
const LIST_ATTRIBUTES: &[&str] = &[
    "cpu_spec_list",
    "exc_nodes",
    "features",
    "features_active",
    "gres",
    "partitions",
    "req_nodes",
];

/// Slurm resource manager queried through its command-line tools.
#[derive(Debug, Clone)]
pub struct ScontrolSource {
    /// Directory holding `scontrol`, `sinfo` and `squeue` (PATH lookup if unset).
    bin_dir: Option<PathBuf>,
    /// Timeout applied to every command.
    timeout: Duration,
}

impl ScontrolSource {
    /// Create a source using the tools found on PATH.
    pub fn new() -> Self {
        Self {
            bin_dir: None,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Use the tools from a specific directory.
    pub fn with_bin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bin_dir = Some(dir.into());
        self
    }

    /// Set the per-command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn program(&self, name: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    /// Run a tool and return its stdout.
    ///
    /// A non-zero exit whose stderr says the entity does not exist is reported
    /// as `Ok(None)`.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Option<String>, SourceError> {
        let command_line = format!("{} {}", program, args.join(" "));
        let mut cmd = Command::new(self.program(program));
        cmd.args(args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let output = timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| SourceError::Command {
                command: command_line.clone(),
                reason: format!("timed out after {:?}", self.timeout),
            })?
            .map_err(|e| SourceError::Unavailable(format!("{}: {}", command_line, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if output.status.success() {
            return Ok(Some(stdout));
        }

        let stderr = String::from_utf8_lossy(&output.stderr).to_lowercase();
        if stderr.contains("not found") || stderr.contains("invalid job id") {
            return Ok(None);
        }
        Err(SourceError::Command {
            command: command_line,
            reason: format!(
                "exit code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ),
        })
    }
}

impl Default for ScontrolSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterSource for ScontrolSource {
    async fn list_identities(&self, kind: EntityKind) -> Result<BTreeSet<Identity>, SourceError> {
        let (program, args): (&str, &[&str]) = match kind {
            EntityKind::Node => ("sinfo", &["-h", "-N", "-o", "%N"]),
            EntityKind::Partition => ("sinfo", &["-h", "-o", "%R"]),
            EntityKind::Job => ("squeue", &["-h", "-o", "%A"]),
        };
        // "not found" only means something for a single-entity lookup; a
        // listing that says so has failed.
        let output = self
            .run(program, args)
            .await?
            .ok_or_else(|| SourceError::Command {
                command: format!("{} {}", program, args.join(" ")),
                reason: "listing reported a missing entity".to_string(),
            })?;

        let mut ids = BTreeSet::new();
        for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match kind.parse_identity(line) {
                Some(id) => {
                    ids.insert(id);
                }
                None => tracing::debug!(kind = %kind, line, "Ignoring unparseable identity"),
            }
        }
        Ok(ids)
    }

    async fn fetch(
        &self,
        kind: EntityKind,
        identity: &Identity,
    ) -> Result<RawAttributes, SourceError> {
        let id = identity.to_string();
        let output = self
            .run("scontrol", &["show", kind.as_str(), &id, "--oneliner"])
            .await?;

        let not_found = || SourceError::NotFound {
            kind,
            identity: identity.clone(),
        };
        let output = output.ok_or_else(not_found)?;

        output
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| parse_oneliner(kind, line))
            .find(|attrs| {
                attrs
                    .get(kind.identity_field())
                    .and_then(|v| kind.identity_from_value(v))
                    .as_ref()
                    == Some(identity)
            })
            .ok_or_else(not_found)
    }
}

/// Parse one line of `scontrol show ... --oneliner` output.
///
/// Values may contain spaces (`OS=Linux 5.14.0 #1 SMP`), so a token without
/// `=` continues the previous value.
pub fn parse_oneliner(kind: EntityKind, line: &str) -> RawAttributes {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for token in line.split_whitespace() {
        match token.split_once('=') {
            Some((key, value)) if is_key(key) => pairs.push((key.to_string(), value.to_string())),
            _ => {
                if let Some((_, value)) = pairs.last_mut() {
                    value.push(' ');
                    value.push_str(token);
                }
            }
        }
    }

    pairs
        .into_iter()
        .map(|(key, value)| {
            let name = attribute_name(kind, &key);
            let value = parse_value(kind, &name, &value);
            (name, value)
        })
        .collect()
}

fn is_key(key: &str) -> bool {
    key.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '/' || c == ':')
}

/// Map a Slurm key to the attribute name used by the category tables.
fn attribute_name(kind: EntityKind, key: &str) -> String {
    let alias = match (kind, key) {
        (EntityKind::Node, "NodeName") => Some("name"),
        (EntityKind::Node, "CPUAlloc") => Some("alloc_cpus"),
        (EntityKind::Node, "CPUTot") => Some("cpus"),
        (EntityKind::Node, "CPUErr") => Some("err_cpus"),
        (EntityKind::Node, "CPULoad") => Some("cpu_load"),
        (EntityKind::Node, "CoreSpecCount") => Some("core_spec_cnt"),
        (EntityKind::Node, "AvailableFeatures") => Some("features"),
        (EntityKind::Node, "ActiveFeatures") => Some("features_active"),
        (EntityKind::Node, "NodeHostName") => Some("node_hostname"),
        (EntityKind::Node, "OS") => Some("os"),
        (EntityKind::Node, "ThreadsPerCore") => Some("threads"),
        (EntityKind::Node, "CfgTRES") => Some("tres_fmt_str"),
        (EntityKind::Node, "MCS_label") => Some("mcs_label"),
        (EntityKind::Partition, "PartitionName") => Some("name"),
        (EntityKind::Partition, "AllocNodes") => Some("allow_alloc_nodes"),
        (EntityKind::Partition, "MaxCPUsPerNode") => Some("max_cpus_per_node"),
        (EntityKind::Partition, "TotalCPUs") => Some("total_cpus"),
        (EntityKind::Partition, "TRES") => Some("tres_fmt_str"),
        (EntityKind::Partition, "QoS") => Some("qos_char"),
        (EntityKind::Partition, "TRESBillingWeights") => Some("billing_weights_str"),
        (EntityKind::Partition, "DefMemPerCPU") => Some("def_mem_per_cpu"),
        (EntityKind::Partition, "MaxMemPerCPU") => Some("max_mem_per_cpu"),
        (EntityKind::Job, "JobId") => Some("job_id"),
        (EntityKind::Job, "JobName") => Some("name"),
        (EntityKind::Job, "Reason") => Some("state_reason"),
        (EntityKind::Job, "RunTime") => Some("run_time_str"),
        (EntityKind::Job, "NodeList") => Some("nodes"),
        (EntityKind::Job, "ReqNodeList") => Some("req_nodes"),
        (EntityKind::Job, "ExcNodeList") => Some("exc_nodes"),
        (EntityKind::Job, "NumCPUs") => Some("num_cpus"),
        (EntityKind::Job, "CPUs/Task") => Some("cpus_per_task"),
        (EntityKind::Job, "DerivedExitCode") => Some("derived_ec"),
        (EntityKind::Job, "Restarts") => Some("restart_cnt"),
        (EntityKind::Job, "MinCPUsNode") => Some("pn_min_cpus"),
        (EntityKind::Job, "MinTmpDiskNode") => Some("pn_min_tmp_disk"),
        (EntityKind::Job, "ReqTRES") => Some("tres_req_str"),
        (EntityKind::Job, "AllocTRES") => Some("tres_alloc_str"),
        (EntityKind::Job, "OverSubscribe") => Some("shared"),
        (EntityKind::Job, "Power") => Some("power_flags"),
        (EntityKind::Job, "Switches") => Some("req_switch"),
        (EntityKind::Job, "WCKey") => Some("wckey"),
        (EntityKind::Job, "Socks/Node") => Some("sockets_per_node"),
        _ => None,
    };
    alias.map(str::to_string).unwrap_or_else(|| snake_case(key))
}

/// Convert a CamelCase Slurm key into snake_case (`MaxNodes` -> `max_nodes`,
/// `TmpDisk` -> `tmp_disk`, `AllowQos` -> `allow_qos`).
fn snake_case(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c == '/' {
            out.push_str("_per_");
            continue;
        }
        if c == ':' {
            out.push('_');
            continue;
        }
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            // plural acronyms such as CPUs stay in one word
            let plural = chars.get(i + 1) == Some(&'s')
                && !chars.get(i + 2).is_some_and(|n| n.is_ascii_lowercase());
            let next_lower =
                !plural && chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            if prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_lower)
            {
                if !out.ends_with('_') {
                    out.push('_');
                }
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

fn parse_value(kind: EntityKind, name: &str, raw: &str) -> Value {
    let raw = raw.trim();
    if matches!(raw, "" | "(null)" | "N/A" | "None") {
        return Value::Null;
    }
    if LIST_ATTRIBUTES.contains(&name) {
        return Value::Array(
            raw.split(',')
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect(),
        );
    }
    if kind == EntityKind::Job && name == "dependency" {
        // afterok:12,afterany:13:14(unfulfilled)
        let ids: Vec<Value> = raw
            .split(|c: char| c == ',' || c == ':' || c == '?' || c == '(')
            .filter_map(|s| s.parse::<i64>().ok())
            .map(Value::from)
            .collect();
        return Value::Array(ids);
    }
    match raw.parse::<i64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::String(raw.to_string()),
    }
}
