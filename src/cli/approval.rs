//! Interactive production approval

use anyhow::{bail, Result};
use std::future::Future;
use std::io::BufRead;
use tracing::{info, warn};

use crate::core::{Phase, StatusSnapshot};
use crate::execution::{PipelineHandle, Signal};

/// Operator's reply to the approval prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalAnswer {
    Approved,
    Declined,
    /// Input reached end of file
    Closed,
}

/// Read one reply; anything but `y`/`yes` declines
pub fn read_answer<R: BufRead>(input: &mut R) -> std::io::Result<ApprovalAnswer> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(ApprovalAnswer::Closed);
    }
    Ok(match line.trim().to_lowercase().as_str() {
        "y" | "yes" => ApprovalAnswer::Approved,
        _ => ApprovalAnswer::Declined,
    })
}

/// Wait for the approval gate, then ask until the operator approves
///
/// A declined prompt leaves the run suspended and asks again with a fresh
/// snapshot. Closed input abandons the prompt with an error; the run itself
/// stays suspended. Never resolves if the run stops before the gate.
pub async fn approve_interactively<F, Fut>(handle: &PipelineHandle, mut ask: F) -> Result<()>
where
    F: FnMut(StatusSnapshot) -> Fut,
    Fut: Future<Output = Result<ApprovalAnswer>>,
{
    let snapshot = handle.wait_for_phase(Phase::AwaitingApproval).await;
    if !snapshot.awaiting_approval {
        std::future::pending::<()>().await;
    }

    loop {
        match ask(handle.status()).await? {
            ApprovalAnswer::Approved => {
                handle.signal(Signal::ApproveProdDeployment);
                return Ok(());
            }
            ApprovalAnswer::Declined => {
                info!("Approval withheld; run {} stays suspended", handle.run_id());
            }
            ApprovalAnswer::Closed => {
                warn!("Approval input closed for run {}", handle.run_id());
                bail!(
                    "input closed while run {} awaited approval; run abandoned",
                    handle.run_id()
                )
            }
        }
    }
}
