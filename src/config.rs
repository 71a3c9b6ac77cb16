use clap::{Parser, ValueEnum};
use domain_controller::crd::ReclaimPolicy;
use ingress_controller::driver::DEFAULT_MAX_CONCURRENT_OPS;
use ingress_controller::ir::MappingStrategy;
use ingress_controller::labels::Ownership;
use ingress_controller::synth::{SynthConfig, DEFAULT_CLUSTER_DOMAIN};
use ingress_controller::translate::{
    TranslateConfig, DEFAULT_GATEWAY_CONTROLLER_NAME, DEFAULT_INGRESS_CONTROLLER_NAME,
};
use ingress_controller::DriverConfig;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// ngrok ingress and gateway controller
#[derive(Parser, Debug)]
#[command(name = "controller", version, about, long_about = None)]
pub struct Config {
    /// Name stamped on every produced resource, used to find them again
    #[arg(long, env = "CONTROLLER_NAME", default_value = "ngrok-ingress-controller")]
    pub controller_name: String,

    #[arg(long, env = "POD_NAMESPACE", default_value = "ngrok-operator")]
    pub controller_namespace: String,

    /// IngressClass controller value handled by this controller
    #[arg(long, default_value = DEFAULT_INGRESS_CONTROLLER_NAME)]
    pub ingress_controller_name: String,

    /// GatewayClass controllerName handled by this controller
    #[arg(long, default_value = DEFAULT_GATEWAY_CONTROLLER_NAME)]
    pub gateway_controller_name: String,

    #[arg(long)]
    pub enable_gateway_api: bool,

    #[arg(long, default_value = DEFAULT_CLUSTER_DOMAIN)]
    pub cluster_domain: String,

    /// endpoints or edges
    #[arg(long, default_value = "endpoints")]
    pub default_mapping_strategy: MappingStrategy,

    /// Delete or Retain, applied to domains when they are created
    #[arg(long, default_value = "Delete")]
    pub default_domain_reclaim_policy: ReclaimPolicy,

    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENT_OPS)]
    pub max_concurrent_ops: usize,

    /// Seconds between full cleanup passes
    #[arg(long, default_value_t = 300)]
    pub sweep_interval_secs: u64,

    #[arg(long, env = "NGROK_API_URL", default_value = ngrokext::DEFAULT_API_URL)]
    pub api_url: String,

    #[arg(long, env = "NGROK_API_KEY", hide_env_values = true)]
    pub api_key: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            translate: TranslateConfig {
                ingress_controller_name: self.ingress_controller_name.clone(),
                gateway_controller_name: self.gateway_controller_name.clone(),
                enable_gateway_api: self.enable_gateway_api,
                default_mapping_strategy: self.default_mapping_strategy,
            },
            synth: SynthConfig {
                cluster_domain: self.cluster_domain.clone(),
                default_domain_reclaim_policy: self.default_domain_reclaim_policy,
                ownership: Ownership::new(&self.controller_name, &self.controller_namespace),
            },
            max_concurrent_ops: self.max_concurrent_ops,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_onto_driver_config() {
        let config = Config::try_parse_from([
            "controller",
            "--api-key",
            "secret",
            "--controller-name",
            "ngrok",
            "--controller-namespace",
            "system",
            "--enable-gateway-api",
            "--default-mapping-strategy",
            "edges",
            "--default-domain-reclaim-policy",
            "Retain",
            "--max-concurrent-ops",
            "2",
        ])
        .unwrap();

        let driver = config.driver_config();
        assert!(driver.translate.enable_gateway_api);
        assert_eq!(driver.translate.default_mapping_strategy, MappingStrategy::Edges);
        assert_eq!(driver.translate.ingress_controller_name, DEFAULT_INGRESS_CONTROLLER_NAME);
        assert_eq!(driver.synth.default_domain_reclaim_policy, ReclaimPolicy::Retain);
        assert_eq!(driver.synth.ownership, Ownership::new("ngrok", "system"));
        assert_eq!(driver.synth.cluster_domain, "svc.cluster.local");
        assert_eq!(driver.max_concurrent_ops, 2);
        assert_eq!(config.sweep_interval(), Duration::from_secs(300));
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn unknown_mapping_strategy_is_rejected() {
        let result = Config::try_parse_from([
            "controller",
            "--api-key",
            "secret",
            "--default-mapping-strategy",
            "tunnels",
        ]);
        assert!(result.is_err());
    }
}
