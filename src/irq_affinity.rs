//! IRQ/RSS steering (optional supplement, off by default): best-effort
//! placement of network-adapter interrupt load onto the topology's
//! non-foreground cores, so the P-cores (or gaming cores on a uniform part)
//! stay free of interrupt jitter. A failure here never affects the rest of
//! the optimizer — every call is logged at DEBUG and swallowed.

use crate::probe::topology::CpuTopology;

/// Split of the topology into the cores reserved for foreground/gaming work
/// and the cores steered to absorb interrupt load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrqPlan {
    pub foreground_cores: Vec<usize>,
    pub irq_cores: Vec<usize>,
}

/// Derives an [`IrqPlan`] from a topology. Hybrid parts steer interrupts to
/// the E-cores, keeping P-cores free; uniform parts split logical cores
/// roughly in half, reserving the back half for IRQs.
pub fn plan_for_topology(topology: &CpuTopology) -> IrqPlan {
    if topology.hybrid && !topology.e_cores.is_empty() {
        return IrqPlan {
            foreground_cores: topology.p_cores.clone(),
            irq_cores: topology.e_cores.clone(),
        };
    }

    let total = topology.total_logical_cores.max(1);
    let half = (total / 2).max(1);
    IrqPlan {
        foreground_cores: (0..half).collect(),
        irq_cores: (half..total).collect(),
    }
}

/// Applies the plan via `Set-NetAdapterRss`, steering receive-side scaling
/// for every adapter onto the given core range. Best-effort: any failure to
/// launch or a non-zero exit is logged at DEBUG and otherwise ignored.
pub fn apply(plan: &IrqPlan) {
    if plan.irq_cores.is_empty() {
        return;
    }
    let base = plan.irq_cores[0];
    let count = plan.irq_cores.len();

    let command = format!(
        "Set-NetAdapterRss -Name '*' -BaseProcessorNumber {base} -MaxProcessors {count}"
    );

    match std::process::Command::new("powershell")
        .args(["-NoProfile", "-NonInteractive", "-Command", &command])
        .output()
    {
        Ok(output) if !output.status.success() => {
            tracing::debug!(
                status = ?output.status,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "irq steering: Set-NetAdapterRss reported failure"
            );
        }
        Ok(_) => {
            tracing::debug!(base, count, "irq steering applied");
        }
        Err(err) => {
            tracing::debug!(%err, "irq steering: failed to launch powershell");
        }
    }
}
