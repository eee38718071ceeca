use kube::CustomResourceExt;
use tfjob_operator::crd::TFJob;

fn main() -> anyhow::Result<()> {
    println!("---");
    println!("# TFJob CRD");
    println!("{}", serde_yaml::to_string(&TFJob::crd())?);
    Ok(())
}
