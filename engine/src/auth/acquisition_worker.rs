use super::credential::Credential;
use super::provider::{Acquisition, IdentityProvider};
use crate::common::EngineError;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tokio::sync::oneshot;

pub const WORKER_THREAD_NAME: &str = "acquire-token";

struct AcquisitionJob {
    acquisition: Acquisition,
    reply: oneshot::Sender<Result<Credential, EngineError>>,
}

/// Runs identity-provider calls on a single dedicated thread.
///
/// The identity provider's prompt must not be driven from arbitrary executor
/// threads, so every acquisition (interactive, silent or client secret) is
/// queued to one OS thread that owns its own current-thread runtime. Jobs are
/// processed strictly one after another; callers simply await [`submit`].
///
/// The worker thread exits once the `AcquisitionWorker` is dropped.
///
/// [`submit`]: AcquisitionWorker::submit
pub struct AcquisitionWorker {
    sender: flume::Sender<AcquisitionJob>,
}

impl AcquisitionWorker {
    pub fn spawn(provider: Arc<dyn IdentityProvider>) -> Result<Self, EngineError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                EngineError::AcquisitionFailed(format!("failed to build acquisition runtime: {e}"))
            })?;

        let (sender, receiver) = flume::bounded::<AcquisitionJob>(1);

        std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    log::debug!(
                        "Running {} acquisition for tenant {}",
                        job.acquisition.kind(),
                        job.acquisition.tenant_id()
                    );

                    // A panicking provider must not take the only worker thread down.
                    let result = catch_unwind(AssertUnwindSafe(|| {
                        runtime.block_on(provider.acquire(&job.acquisition))
                    }))
                    .unwrap_or_else(|panic| {
                        let reason = panic_message(panic.as_ref());
                        log::error!(
                            "Identity provider panicked during {} acquisition: {reason}",
                            job.acquisition.kind()
                        );
                        Err(EngineError::AcquisitionFailed(format!(
                            "identity provider panicked: {reason}"
                        )))
                    });
                    if job.reply.send(result).is_err() {
                        log::debug!("Acquisition caller went away before the result arrived");
                    }
                }
                log::debug!("Acquisition worker shutting down");
            })
            .map_err(|e| {
                EngineError::AcquisitionFailed(format!("failed to start acquisition thread: {e}"))
            })?;

        Ok(Self { sender })
    }

    /// Queues `acquisition` and waits for the identity provider's answer.
    pub async fn submit(&self, acquisition: Acquisition) -> Result<Credential, EngineError> {
        let (reply, response) = oneshot::channel();

        self.sender
            .send_async(AcquisitionJob { acquisition, reply })
            .await
            .map_err(|_| EngineError::AcquisitionFailed("acquisition worker stopped".to_string()))?;

        response.await.map_err(|_| {
            EngineError::AcquisitionFailed("acquisition worker dropped the request".to_string())
        })?
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|msg| msg.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
