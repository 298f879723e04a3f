//! Raw attribute bags shaped like the ones Slurm reports.

use serde_json::{json, Value};

use crate::core::record::RawAttributes;
use crate::core::types::EntityKind;
use crate::source::InMemorySource;

fn attributes(value: Value) -> RawAttributes {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        _ => RawAttributes::new(),
    }
}

/// A compute node in the `debug` partition.
pub fn node(name: &str, state: &str) -> RawAttributes {
    attributes(json!({
        "name": name,
        "state": state,
        "partitions": ["debug"],
        "cpus": 16,
        "sockets": 2,
        "cores_per_socket": 8,
        "threads": 1,
        "real_memory": 64000,
        "gres": [],
        "arch": "x86_64",
        "os": "Linux",
        "node_hostname": name,
        "boot_time": 1700000000,
        "cpu_load": 12,
        "free_mem": 52000,
        "alloc_cpus": 0,
        "alloc_mem": 0,
    }))
}

/// A partition spanning four nodes.
pub fn partition(name: &str, state: &str) -> RawAttributes {
    attributes(json!({
        "name": name,
        "state": state,
        "nodes": "n[1-4]",
        "total_cpus": 64,
        "total_nodes": 4,
        "max_nodes": "UNLIMITED",
        "max_time": "UNLIMITED",
        "allow_groups": "ALL",
        "allow_accounts": "ALL",
        "priority_job_factor": 1,
        "priority_tier": 1,
    }))
}

/// A batch job in the `debug` partition.
pub fn job(id: i64, state: &str) -> RawAttributes {
    attributes(json!({
        "job_id": id,
        "job_state": state,
        "partition": "debug",
        "name": format!("job-{}", id),
        "command": "/home/alice/run.sh",
        "dependency": [],
        "user_id": 1000,
        "group_id": 100,
        "account": "research",
        "num_cpus": 4,
        "num_nodes": 1,
        "submit_time": 1700000000,
        "nice": 0,
    }))
}

/// A source holding `nodes` nodes, one partition, and `jobs` jobs.
pub fn cluster(nodes: usize, jobs: usize) -> InMemorySource {
    let source = InMemorySource::new();
    for i in 0..nodes {
        let name = format!("n{}", i + 1);
        source.insert(EntityKind::Node, name.as_str(), node(&name, "IDLE"));
    }
    source.insert(EntityKind::Partition, "debug", partition("debug", "UP"));
    for i in 0..jobs {
        let id = i as i64 + 1;
        source.insert(EntityKind::Job, id, job(id, "PENDING"));
    }
    source
}
