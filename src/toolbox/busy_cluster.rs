//! Commands making a cluster busy with lots of resources

use rolekit::{ArgSpec, CommandGroup, CommandSpec};

const NAMESPACE_LABEL_KEY: ArgSpec = ArgSpec::optional(
    "namespace_label_key",
    "the label key to use to locate the namespaces to populate",
    "busy-cluster.keel",
);

const NAMESPACE_LABEL_VALUE: ArgSpec = ArgSpec::optional(
    "namespace_label_value",
    "the label value to use to locate the namespaces to populate",
    "'yes'",
);

const LABELS: ArgSpec = ArgSpec::optional(
    "labels",
    "mapping of the key/value labels to set on the created resources",
    "{}",
);

pub static BUSY_CLUSTER: CommandGroup = CommandGroup {
    name: "busy_cluster",
    doc: "Commands relating to make a cluster busy with lot of resources",
    commands: &[
        CommandSpec {
            name: "create_namespaces",
            role: "busy_cluster_create_namespaces",
            doc: "Creates namespaces to make a cluster busy",
            mapped_params: true,
            skip_config_generation: false,
            constants: &[],
            args: &[
                ArgSpec::optional(
                    "prefix",
                    "prefix to give to the namespaces to create",
                    "busy-namespace",
                ),
                ArgSpec::optional("count", "number of namespaces to create", "10"),
                LABELS,
            ],
        },
        CommandSpec {
            name: "create_configmaps",
            role: "busy_cluster_create_configmaps",
            doc: "Creates configmaps and secrets to make a cluster busy",
            mapped_params: true,
            skip_config_generation: false,
            constants: &[],
            args: &[
                NAMESPACE_LABEL_KEY,
                NAMESPACE_LABEL_VALUE,
                ArgSpec::optional("prefix", "prefix to give to the configmaps/secrets", "busy"),
                ArgSpec::optional("count", "number of configmaps/secrets to create", "10"),
                LABELS,
                ArgSpec::optional("as_secrets", "create secrets instead of configmaps", "false"),
                ArgSpec::optional("entries", "number of entries to create", "10"),
                ArgSpec::optional("entry_values_length", "length of an entry value", "1024"),
                ArgSpec::optional("entry_keys_prefix", "prefix of the entry keys", "entry-"),
            ],
        },
        CommandSpec {
            name: "create_deployments",
            role: "busy_cluster_create_deployments",
            doc: "Creates deployments to make a cluster busy",
            mapped_params: true,
            skip_config_generation: false,
            constants: &[],
            args: &[
                NAMESPACE_LABEL_KEY,
                NAMESPACE_LABEL_VALUE,
                ArgSpec::optional("prefix", "prefix to give to the deployments", "busy"),
                ArgSpec::optional("count", "number of deployments to create", "1"),
                LABELS,
                ArgSpec::optional("replicas", "number of replicas of the deployments", "1"),
                ArgSpec::optional("services", "number of services per deployment", "1"),
                ArgSpec::optional("image_pull_back_off", "make the image pull fail", "false"),
                ArgSpec::optional("crash_loop_back_off", "make the containers fail", "false"),
            ],
        },
        CommandSpec {
            name: "create_jobs",
            role: "busy_cluster_create_jobs",
            doc: "Creates jobs to make a cluster busy",
            mapped_params: true,
            skip_config_generation: false,
            constants: &[],
            args: &[
                NAMESPACE_LABEL_KEY,
                NAMESPACE_LABEL_VALUE,
                ArgSpec::optional("prefix", "prefix to give to the jobs", "busy"),
                ArgSpec::optional("count", "number of jobs to create", "10"),
                LABELS,
                ArgSpec::optional("replicas", "number of parallel tasks to execute", "2"),
                ArgSpec::optional("runtime", "runtime of the job pods, in seconds", "120"),
            ],
        },
        CommandSpec {
            name: "status",
            role: "busy_cluster_status",
            doc: "Shows the busyness of the cluster",
            mapped_params: true,
            skip_config_generation: false,
            constants: &[],
            args: &[NAMESPACE_LABEL_KEY, NAMESPACE_LABEL_VALUE],
        },
        CommandSpec {
            name: "cleanup",
            role: "busy_cluster_cleanup",
            doc: "Cleans up the namespaces making the cluster busy",
            mapped_params: true,
            skip_config_generation: false,
            constants: &[],
            args: &[NAMESPACE_LABEL_KEY, NAMESPACE_LABEL_VALUE],
        },
    ],
};
