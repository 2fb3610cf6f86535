//! Commands relating to cluster upgrades and environment capture

use rolekit::{ArgSpec, CommandGroup, CommandSpec, RoleConstant};

const PROMETHEUS_LABEL: ArgSpec = ArgSpec::optional(
    "label",
    "label used to identify the Prometheus pod",
    "app.kubernetes.io/component=prometheus",
);

const PROMETHEUS_NAMESPACE: ArgSpec = ArgSpec::optional(
    "namespace",
    "namespace where to search the Prometheus pod",
    "openshift-monitoring",
);

pub static CLUSTER: CommandGroup = CommandGroup {
    name: "cluster",
    doc: "Commands relating to cluster upgrading and environment capture",
    commands: &[
        CommandSpec {
            name: "capture_environment",
            role: "cluster_capture_environment",
            doc: "Captures the cluster environment",
            mapped_params: true,
            skip_config_generation: false,
            constants: &[],
            args: &[],
        },
        CommandSpec {
            name: "upgrade_to_image",
            role: "cluster_upgrade_to_image",
            doc: "Upgrades the cluster to the given image",
            mapped_params: true,
            skip_config_generation: false,
            constants: &[],
            args: &[ArgSpec::required("image", "the image to upgrade the cluster to")],
        },
        CommandSpec {
            name: "wait_fully_awake",
            role: "cluster_wait_fully_awake",
            doc: "Waits for the cluster to be fully awake after a restart",
            mapped_params: true,
            skip_config_generation: false,
            constants: &[],
            args: &[],
        },
        CommandSpec {
            name: "reset_prometheus_db",
            role: "cluster_prometheus_db",
            doc: "Resets the Prometheus database by destroying its pod",
            mapped_params: true,
            skip_config_generation: false,
            constants: &[
                RoleConstant {
                    name: "directory",
                    doc: "Directory to dump on the Prometheus pod",
                    value: "/prometheus",
                },
                RoleConstant {
                    name: "dump_name_prefix",
                    doc: "Prefix to apply to the db name in 'dump' mode",
                    value: "prometheus",
                },
            ],
            args: &[
                ArgSpec::optional("mode", "'reset' or 'dump'", "reset"),
                PROMETHEUS_LABEL,
                PROMETHEUS_NAMESPACE,
            ],
        },
        // Same role as reset_prometheus_db: its defaults are generated there
        CommandSpec {
            name: "dump_prometheus_db",
            role: "cluster_prometheus_db",
            doc: "Dumps the Prometheus database into a file",
            mapped_params: true,
            skip_config_generation: true,
            constants: &[RoleConstant {
                name: "mode",
                doc: "",
                value: "dump",
            }],
            args: &[
                PROMETHEUS_LABEL,
                PROMETHEUS_NAMESPACE,
                ArgSpec::optional(
                    "dump_name_prefix",
                    "name prefix of the stored archive",
                    "prometheus",
                ),
            ],
        },
    ],
};
