use domain_controller::crd::Domain;
use ingress_controller::crd::{AgentEndpoint, CloudEndpoint, HTTPSEdge, NgrokTrafficPolicy, Tunnel};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;
use std::{env, fs};

fn write_crd(name: &str, crd: CustomResourceDefinition) -> anyhow::Result<()> {
    let path = env::current_dir()?.join(format!("{name}_crd.yaml"));
    fs::write(&path, serde_yaml::to_string(&crd)?)?;
    println!("wrote {}", path.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    write_crd("domain", Domain::crd())?;
    write_crd("https_edge", HTTPSEdge::crd())?;
    write_crd("tunnel", Tunnel::crd())?;
    write_crd("cloud_endpoint", CloudEndpoint::crd())?;
    write_crd("agent_endpoint", AgentEndpoint::crd())?;
    write_crd("ngrok_traffic_policy", NgrokTrafficPolicy::crd())?;
    Ok(())
}
