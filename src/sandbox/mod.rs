pub mod env;
pub mod process;
pub mod workspace;

#[cfg(all(test, unix))]
pub(crate) mod testing;

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    config::{ToolchainConfig, WorkspaceConfig},
    error::ExecutionError,
    models::{ExecutionOutcome, ExecutionRequest},
};

pub use env::CommandEnv;
pub use process::{CommandSpec, ProcessSupervisor, SupervisedOutcome};
pub use workspace::{Workspace, WorkspaceManager};

#[async_trait]
pub trait CodeRunner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Never fails: every stage error comes back as a failed outcome.
    async fn execute(&self, request: ExecutionRequest) -> ExecutionOutcome;
}

/// Workspace, snippet, supervised `cargo run`, cleanup.
pub struct ExecutionService {
    toolchain: Arc<ToolchainConfig>,
    workspaces: WorkspaceManager,
    supervisor: ProcessSupervisor,
}

impl ExecutionService {
    pub fn new(
        toolchain: Arc<ToolchainConfig>,
        workspace_config: WorkspaceConfig,
        supervisor: ProcessSupervisor,
    ) -> Self {
        Self {
            workspaces: WorkspaceManager::new(workspace_config, toolchain.clone()),
            toolchain,
            supervisor,
        }
    }

    async fn run_pipeline(&self, code: &str) -> Result<(Uuid, SupervisedOutcome), ExecutionError> {
        let workspace = self.workspaces.create().await?;
        let id = workspace.id();
        let result = self.build_and_run(&workspace, code).await;
        workspace.release().await;
        Ok((id, result?))
    }

    async fn build_and_run(
        &self,
        workspace: &Workspace,
        code: &str,
    ) -> Result<SupervisedOutcome, ExecutionError> {
        self.workspaces.write_source(workspace, code).await?;

        let env = CommandEnv::for_build(&self.toolchain, std::env::vars_os());
        let spec = CommandSpec::new(&self.toolchain.cargo_path, workspace.path(), env)
            .args(["run", "--target", self.toolchain.target_triple()]);
        Ok(self.supervisor.run(spec).await?)
    }
}

#[async_trait]
impl CodeRunner for ExecutionService {
    fn name(&self) -> &'static str {
        "cargo"
    }

    async fn execute(&self, request: ExecutionRequest) -> ExecutionOutcome {
        let started = Instant::now();
        match self.run_pipeline(&request.code).await {
            Ok((id, SupervisedOutcome::Completed { status, stdout, stderr })) => {
                tracing::info!(
                    execution_id = %id,
                    status = %status,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "execution completed"
                );
                if status.success() {
                    ExecutionOutcome::succeeded(stdout, stderr)
                } else {
                    ExecutionOutcome::exited_with_failure(stdout, stderr)
                }
            }
            Ok((id, SupervisedOutcome::TimedOut { deadline })) => {
                tracing::warn!(
                    execution_id = %id,
                    deadline_secs = deadline.as_secs(),
                    "execution timed out"
                );
                ExecutionOutcome::timed_out(deadline)
            }
            Err(err) => {
                tracing::error!(error = %err, "execution failed");
                ExecutionOutcome::failure(err.to_string())
            }
        }
    }
}
