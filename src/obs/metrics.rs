// self
use crate::obs::{OpKind, OpOutcome};

/// Records an operation outcome via the global metrics recorder (when enabled).
pub fn record_op_outcome(kind: OpKind, outcome: OpOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"saml_provision_op_total",
			"op" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn record_op_outcome_noop_without_metrics() {
		record_op_outcome(OpKind::Delete, OpOutcome::Failure);
	}

	#[test]
	fn outcome_follows_result() {
		assert_eq!(OpOutcome::of(&Ok::<(), ()>(())), OpOutcome::Success);
		assert_eq!(OpOutcome::of(&Err::<(), ()>(())), OpOutcome::Failure);
	}
}
