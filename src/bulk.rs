//! Bulk operations composed from registry calls.
//!
//! Every item of a batch is submitted to the shared gate right away and runs as its own task;
//! the gate decides when each one actually starts. Item failures are logged and collected in the
//! [`BatchReport`] instead of failing the batch. Only failures that prevent forming the batch at
//! all (the initial listing) are returned as errors.

// crates.io
use tokio::task::JoinSet;
// self
use crate::{
	_prelude::*,
	metadata::{ConnectionDescriptor, NamingError},
	registry::{ConnectionSummary, ListFilter, RegistryClient},
};

/// One item of a batch that did not complete.
#[derive(Debug)]
pub struct ItemFailure {
	/// Entity ID (create) or connection ID (delete) of the item.
	pub subject: String,
	/// Connection name of the item.
	pub name: String,
	/// What went wrong.
	pub error: Error,
}
impl From<NamingError> for ItemFailure {
	fn from(error: NamingError) -> Self {
		let NamingError::Unnamed { entity_id } = &error;

		Self { subject: entity_id.clone(), name: String::new(), error: error.into() }
	}
}

/// Tally of a finished batch.
#[derive(Debug, Default)]
pub struct BatchReport {
	/// Items in the batch, including those rejected before submission.
	pub attempted: usize,
	/// Items that completed.
	pub succeeded: usize,
	/// Items that failed, in completion order.
	pub failures: Vec<ItemFailure>,
}
impl BatchReport {
	/// Whether every submitted item completed.
	pub fn is_clean(&self) -> bool {
		self.failures.is_empty()
	}

	/// Counts items rejected before any registry call as failed members of the batch.
	pub fn record_rejected<I>(&mut self, rejected: I)
	where
		I: IntoIterator,
		I::Item: Into<ItemFailure>,
	{
		for failure in rejected {
			self.attempted += 1;
			self.failures.push(failure.into());
		}
	}
}

#[derive(Debug, Default)]
struct ItemLabel {
	subject: String,
	name: String,
}

/// Drives count, delete-all and create-all against one registry client.
#[derive(Clone, Debug)]
pub struct BulkRunner {
	client: RegistryClient,
	filter: ListFilter,
}
impl BulkRunner {
	/// Creates a runner listing SAML connections.
	pub fn new(client: RegistryClient) -> Self {
		Self { client, filter: ListFilter::default() }
	}

	/// Overrides the listing filter used by [`count`](Self::count) and
	/// [`delete_all`](Self::delete_all).
	pub fn with_filter(mut self, filter: ListFilter) -> Self {
		self.filter = filter;

		self
	}

	/// Counts the SAML connections in the registry.
	pub async fn count(&self) -> Result<usize> {
		Ok(self.list().await?.len())
	}

	/// Deletes every SAML connection, one gated call per connection.
	///
	/// Fails only when the listing fails.
	pub async fn delete_all(&self) -> Result<BatchReport> {
		let connections = self.list().await?;

		tracing::info!("connections found: {}", connections.len());

		let tasks = connections.into_iter().map(|ConnectionSummary { id, name }| {
			let client = self.client.clone();
			let label = ItemLabel { subject: id.clone(), name: name.clone() };

			(label, async move {
				client.delete(&id).await?;

				tracing::info!("deleted: {id} ({name})");

				Ok::<_, Error>(())
			})
		});

		Ok(drive(tasks).await)
	}

	/// Creates one connection per descriptor, one gated call per connection.
	///
	/// Never fails; per-item failures are reported in the returned [`BatchReport`].
	pub async fn create_all(
		&self,
		descriptors: Vec<ConnectionDescriptor>,
		sp_entity_id: Option<&str>,
		enabled_clients: &[String],
	) -> BatchReport {
		let sp_entity_id: Option<Arc<str>> = sp_entity_id.map(Arc::from);
		let enabled_clients: Arc<[String]> = Arc::from(enabled_clients);
		let tasks = descriptors.into_iter().map(|descriptor| {
			let client = self.client.clone();
			let sp_entity_id = sp_entity_id.clone();
			let enabled_clients = enabled_clients.clone();
			let label = ItemLabel {
				subject: descriptor.idp_entity_id.clone(),
				name: descriptor.connection_name.clone(),
			};

			(label, async move {
				let connection =
					client.create(&descriptor, sp_entity_id.as_deref(), &enabled_clients).await?;

				tracing::info!("created: {} ({})", connection.id, descriptor.connection_name);

				Ok::<_, Error>(())
			})
		});

		drive(tasks).await
	}

	async fn list(&self) -> Result<Vec<ConnectionSummary>> {
		self.client.list(&self.filter).await
	}
}

async fn drive<I, Fut>(tasks: I) -> BatchReport
where
	I: IntoIterator<Item = (ItemLabel, Fut)>,
	Fut: 'static + Send + Future<Output = Result<()>>,
{
	let mut set = JoinSet::new();
	let mut labels = HashMap::new();
	let mut report = BatchReport::default();

	for (label, task) in tasks {
		report.attempted += 1;
		labels.insert(set.spawn(task).id(), label);
	}

	while let Some(joined) = set.join_next_with_id().await {
		let (id, result) = match joined {
			Ok((id, result)) => (id, result),
			Err(e) => {
				tracing::error!(error = %e, "batch task ended abnormally");

				(e.id(), Err(Error::Task { reason: e.to_string() }))
			},
		};
		let ItemLabel { subject, name } = labels.remove(&id).unwrap_or_default();

		match result {
			Ok(()) => report.succeeded += 1,
			Err(error) => {
				tracing::warn!(%subject, %name, %error, "batch item failed");

				report.failures.push(ItemFailure { subject, name, error });
			},
		}
	}

	report
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn drive_counts_successes_and_keeps_failures() {
		let tasks = (0..4).map(|i| {
			let label = ItemLabel { subject: format!("item-{i}"), name: format!("name-{i}") };

			(label, async move {
				if i % 2 == 0 {
					Ok(())
				} else {
					Err(Error::Remote { status: 500, body: format!("boom {i}") })
				}
			})
		});
		let report = drive(tasks).await;
		let mut failed = report.failures.iter().map(|f| f.subject.as_str()).collect::<Vec<_>>();

		failed.sort_unstable();

		assert_eq!(report.attempted, 4);
		assert_eq!(report.succeeded, 2);
		assert_eq!(failed, vec!["item-1", "item-3"]);
		assert!(!report.is_clean());
	}

	#[tokio::test]
	async fn panicking_items_keep_their_label() {
		let tasks = (0..2).map(|i| {
			let label = ItemLabel { subject: format!("item-{i}"), name: format!("name-{i}") };

			(label, async move {
				if i == 1 {
					panic!("item {i} panicked");
				}

				Ok::<_, Error>(())
			})
		});
		let report = drive(tasks).await;

		assert_eq!(report.attempted, 2);
		assert_eq!(report.succeeded, 1);
		assert_eq!(report.failures.len(), 1);
		assert_eq!(report.failures[0].subject, "item-1");
		assert_eq!(report.failures[0].name, "name-1");
		assert!(matches!(report.failures[0].error, Error::Task { .. }));
	}

	#[test]
	fn rejected_items_count_as_failures() {
		let mut report = BatchReport { attempted: 2, succeeded: 2, failures: Vec::new() };

		report.record_rejected([NamingError::Unnamed { entity_id: "opaque".into() }]);

		assert_eq!(report.attempted, 3);
		assert_eq!(report.succeeded, 2);
		assert_eq!(report.failures[0].subject, "opaque");
		assert!(matches!(report.failures[0].error, Error::Naming(_)));
		assert!(!report.is_clean());
	}

	#[tokio::test]
	async fn empty_batches_are_clean() {
		let report = drive(Vec::<(ItemLabel, std::future::Ready<Result<()>>)>::new()).await;

		assert_eq!(report.attempted, 0);
		assert!(report.is_clean());
	}
}
