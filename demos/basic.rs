use oztf_network::{CoordinatorOptions, RequestCoordinator};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let options = CoordinatorOptions::from_env().map_err(anyhow::Error::msg)?;
    let network = RequestCoordinator::new(options);

    let staff = network.call("staffInfo", json!({"staffId": 1})).await?;
    println!("staff: {staff}");

    // Fire-and-forget form; the outcome arrives on the callback.
    let (done, finished) = tokio::sync::oneshot::channel();
    let done = std::sync::Mutex::new(Some(done));
    network.request("featureList", json!({"page": 1}), move |outcome| {
        match &outcome {
            Ok(features) => println!("features: {features}"),
            Err(err) => eprintln!("feature list failed: {err}"),
        }
        if let Some(done) = done.lock().ok().and_then(|mut slot| slot.take()) {
            let _ = done.send(());
        }
    });
    finished.await?;

    Ok(())
}
