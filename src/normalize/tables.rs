//! Static per-kind category tables.
//!
//! Each table maps raw attribute names (as reported by Slurm) to the bucket
//! they are stored in. Names listed nowhere land in the overflow bucket;
//! denylisted names are dropped.

use crate::core::types::EntityKind;

/// Static description of how one entity kind is normalized.
#[derive(Debug)]
pub struct KindSchema {
    /// Core fields without which the record is meaningless (identity excluded).
    pub required: &'static [&'static str],
    /// Core fields kept at the top level when present.
    pub optional: &'static [&'static str],
    /// Bucket name to the attribute names it holds.
    pub categories: &'static [(&'static str, &'static [&'static str])],
    /// Attribute names never copied into a record.
    pub denylist: &'static [&'static str],
    /// Attribute names stored as text whatever their raw type.
    pub stringified: &'static [&'static str],
}

impl KindSchema {
    /// Whether the name is a core field (identity excluded).
    pub fn is_core(&self, name: &str) -> bool {
        self.required.contains(&name) || self.optional.contains(&name)
    }

    /// Whether the name is denylisted.
    pub fn is_denied(&self, name: &str) -> bool {
        self.denylist.contains(&name)
    }

    /// Whether the raw value must be stringified.
    pub fn is_stringified(&self, name: &str) -> bool {
        self.stringified.contains(&name)
    }

    /// Bucket holding the name, if any category claims it.
    pub fn category_of(&self, name: &str) -> Option<&'static str> {
        self.categories
            .iter()
            .find(|(_, names)| names.contains(&name))
            .map(|(bucket, _)| *bucket)
    }

    /// Names of all category buckets.
    pub fn bucket_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.categories.iter().map(|(bucket, _)| *bucket)
    }
}

/// Get the schema for an entity kind.
pub fn schema(kind: EntityKind) -> &'static KindSchema {
    match kind {
        EntityKind::Node => &NODE,
        EntityKind::Partition => &PARTITION,
        EntityKind::Job => &JOB,
    }
}

static NODE: KindSchema = KindSchema {
    required: &["state"],
    optional: &["partitions"],
    categories: &[
        (
            "resources",
            &[
                "boards",
                "cores",
                "core_spec_cnt",
                "cores_per_socket",
                "cpus",
                "cpu_spec_list",
                "gres",
                "mem_spec_limit",
                "real_memory",
                "sockets",
                "threads",
                "tmp_disk",
                "weight",
            ],
        ),
        (
            "os",
            &[
                "arch",
                "boot_time",
                "features",
                "features_active",
                "node_addr",
                "node_hostname",
                "os",
                "slurmd_start_time",
                "version",
            ],
        ),
        (
            "status",
            &[
                "cpu_load",
                "energy",
                "free_mem",
                "gres_drain",
                "reason_uid",
                "tres_fmt_str",
            ],
        ),
        ("alloc", &["alloc_cpus", "alloc_mem", "err_cpus"]),
    ],
    denylist: &[
        "gres_used",
        "mcs_label",
        "owner",
        "power_mgmt",
        "reason",
        "reason_time",
    ],
    stringified: &[],
};

static PARTITION: KindSchema = KindSchema {
    required: &["state", "nodes"],
    optional: &[],
    categories: &[
        (
            "account",
            &[
                "allow_accounts",
                "allow_alloc_nodes",
                "allow_groups",
                "allow_qos",
            ],
        ),
        (
            "resources",
            &[
                "cr_type",
                "def_mem_per_node",
                "max_cpus_per_node",
                "max_mem_per_node",
                "max_nodes",
                "max_share",
                "min_nodes",
                "total_cpus",
                "total_nodes",
                "tres_fmt_str",
            ],
        ),
        (
            "restrictions",
            &[
                "default_time",
                "default_time_str",
                "grace_time",
                "max_time",
                "max_time_str",
                "over_time_limit",
                "preempt_mode",
            ],
        ),
        ("priorities", &["priority_job_factor", "priority_tier"]),
    ],
    denylist: &[
        "alternate",
        "billing_weights_str",
        "def_mem_per_cpu",
        "deny_accounts",
        "deny_qos",
        // mixed-type mapping, not representable as a uniform bucket
        "flags",
        "max_mem_per_cpu",
        "qos_char",
    ],
    // "UNLIMITED" and integers share these fields.
    stringified: &[
        "def_mem_per_node",
        "default_time",
        "max_cpus_per_node",
        "max_mem_per_node",
        "max_nodes",
        "max_time",
        "over_time_limit",
    ],
};

static JOB: KindSchema = KindSchema {
    required: &["job_state", "partition"],
    optional: &["name", "command", "dependency"],
    categories: &[
        (
            "resources",
            &[
                "billable_tres",
                "boards_per_node",
                "contiguous",
                "cores_per_socket",
                "cpus_allocated",
                "cpus_per_task",
                "exc_nodes",
                "features",
                "licenses",
                "max_cpus",
                "max_nodes",
                "mem_per_cpu",
                "mem_per_node",
                "min_memory_cpu",
                "min_memory_node",
                "nodes",
                "ntasks_per_board",
                "ntasks_per_core",
                "ntasks_per_core_str",
                "ntasks_per_node",
                "ntasks_per_socket",
                "ntasks_per_socket_str",
                "num_cpus",
                "num_nodes",
                "num_tasks",
                "pn_min_cpus",
                "pn_min_memory",
                "pn_min_tmp_disk",
                "req_nodes",
                "shared",
                "sockets_per_board",
                "sockets_per_node",
                "tres_req_str",
            ],
        ),
        (
            "timing",
            &[
                "accrue_time",
                "eligible_time",
                "end_time",
                "last_sched_eval",
                "resize_time",
                "run_time",
                "run_time_str",
                "start_time",
                "submit_time",
                "suspend_time",
                "time_limit",
                "time_min",
            ],
        ),
        (
            "accounting",
            &[
                "account",
                "admin_comment",
                "alloc_node",
                "alloc_sid",
                "assoc_id",
                "batch_flag",
                "comment",
                "derived_ec",
                "exit_code",
                "group_id",
                "reboot",
                "requeue",
                "restart_cnt",
                "std_err",
                "std_in",
                "std_out",
                "system_comment",
                "user_id",
                "work_dir",
            ],
        ),
        (
            "scheduling",
            &[
                "bitflags",
                "nice",
                "power_flags",
                "priority",
                "profile",
                "req_switch",
                "show_flags",
                "state_reason",
                "wait4switch",
            ],
        ),
    ],
    denylist: &[
        "array_job_id",
        "array_max_tasks",
        "array_task_id",
        "array_task_str",
        "batch_features",
        "batch_host",
        "burst_buffer",
        "burst_buffer_state",
        "core_spec",
        "cpu_freq_gov",
        "cpu_freq_max",
        "cpu_freq_min",
        "cpus_alloc_layout",
        "cpus_per_tres",
        "mem_per_tres",
        "network",
        "qos",
        "resv_name",
        "sched_nodes",
        "threads_per_core",
        "tres_alloc_str",
        "tres_bind",
        "tres_freq",
        "tres_per_job",
        "tres_per_node",
        "tres_per_socket",
        "tres_per_task",
        "wckey",
    ],
    stringified: &["billable_tres", "bitflags", "priority", "profile", "time_limit"],
};
