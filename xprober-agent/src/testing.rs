//! In-memory `ControlPlane` for exercising the agent loops

use crate::client::ControlPlane;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use xprober_common::{ProbeResult, Result, TargetDescriptor, XproberError};

#[derive(Default)]
pub struct FakeControlPlane {
    pub targets: Mutex<Vec<TargetDescriptor>>,
    pub pushed: Mutex<Vec<Vec<ProbeResult>>>,
    pub reports: Mutex<Vec<(String, String)>>,
    pub target_requests: Mutex<Vec<(String, String)>>,
    pub failing: AtomicBool,
}

impl FakeControlPlane {
    pub fn set_targets(&self, targets: Vec<TargetDescriptor>) {
        *self.targets.lock() = targets;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(XproberError::RpcError(tonic::Status::unavailable("server down")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn get_targets(
        &self,
        source_region: &str,
        source_ip: &str,
    ) -> Result<Vec<TargetDescriptor>> {
        self.target_requests
            .lock()
            .push((source_region.to_string(), source_ip.to_string()));
        self.check()?;
        Ok(self.targets.lock().clone())
    }

    async fn push_results(&self, results: Vec<ProbeResult>) -> Result<u32> {
        self.check()?;
        let count = results.len() as u32;
        self.pushed.lock().push(results);
        Ok(count)
    }

    async fn report_agent(&self, ip: &str, region: &str) -> Result<()> {
        self.check()?;
        self.reports.lock().push((ip.to_string(), region.to_string()));
        Ok(())
    }
}
