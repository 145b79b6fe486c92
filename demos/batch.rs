use oztf_network::{BatchRequest, CoordinatorOptions, RequestCoordinator, Settled};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let options = CoordinatorOptions::from_env().map_err(anyhow::Error::msg)?;
    let network = RequestCoordinator::new(options);

    let settled = network
        .batch_request(vec![
            BatchRequest::new("departmentStats", json!({})),
            BatchRequest::new("salaryLevelStats", json!({})),
            BatchRequest::new("staffDevelopers", json!({"page": 1}))
                .on_complete(|outcome| println!("developers settled: ok={}", outcome.is_ok())),
        ])
        .await;

    for (index, entry) in settled.into_iter().enumerate() {
        match entry {
            Settled::Fulfilled(data) => println!("#{index} fulfilled: {data}"),
            Settled::Rejected(err) => eprintln!("#{index} rejected: {err}"),
        }
    }

    if !network.failed_requests().is_empty() {
        eprintln!("still failing: {:?}", network.failed_requests());
    }
    network.cleanup();

    Ok(())
}
