use std::fmt::{self, Debug, Display};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use tokio::sync::OnceCell;

use super::{Error, ToolDescriptor, ToolProvider};

type FetchResult = Result<Vec<ToolDescriptor>, Error>;
type FetchFn = Arc<
    dyn Fn() -> Pin<Box<dyn Future<Output = FetchResult> + Send>>
        + Send
        + Sync,
>;

/// Where the tools of a turn came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolSetSource {
    /// The tools were fetched from the provider by this call.
    Server,
    /// The tools were already cached.
    Cache,
}

impl Display for ToolSetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolSetSource::Server => f.write_str("server"),
            ToolSetSource::Cache => f.write_str("cache"),
        }
    }
}

/// A process-wide memo of the tool list.
///
/// The first successful [`resolve`](Self::resolve) fetches the tools from
/// the provider and every later call reuses that list. Concurrent first
/// calls share one fetch. A failed fetch leaves the cache empty, so the
/// next call tries again.
///
/// Cloning a cache yields another handle to the same memo.
#[derive(Clone)]
pub struct ToolCache {
    fetch_fn: FetchFn,
    cell: Arc<OnceCell<Arc<[ToolDescriptor]>>>,
    fetch_count: Arc<AtomicUsize>,
}

impl ToolCache {
    /// Creates an empty cache backed by `provider`.
    pub fn new<P: ToolProvider>(provider: P) -> Self {
        Self::with_cell(provider, OnceCell::new())
    }

    /// Creates a cache backed by `provider` that is already populated with
    /// `tools`. The provider is never asked for the list.
    pub fn with_tools<P: ToolProvider>(
        provider: P,
        tools: Vec<ToolDescriptor>,
    ) -> Self {
        Self::with_cell(provider, OnceCell::new_with(Some(tools.into())))
    }

    /// Creates a populated cache without a provider.
    pub fn from_tools(tools: Vec<ToolDescriptor>) -> Self {
        Self::with_tools(NoProvider, tools)
    }

    fn with_cell<P: ToolProvider>(
        provider: P,
        cell: OnceCell<Arc<[ToolDescriptor]>>,
    ) -> Self {
        let fetch_fn: FetchFn =
            Arc::new(move || Box::pin(provider.fetch_tools()));
        Self {
            fetch_fn,
            cell: Arc::new(cell),
            fetch_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the tool list, fetching it if the cache is empty.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. A cancelled fetch leaves the cache
    /// empty and another caller takes over.
    pub async fn resolve(
        &self,
    ) -> Result<(Arc<[ToolDescriptor]>, ToolSetSource), Error> {
        let started_at = Instant::now();
        let mut source = ToolSetSource::Cache;
        let tools = self
            .cell
            .get_or_try_init(|| {
                source = ToolSetSource::Server;
                self.fetch()
            })
            .await?;
        info!(
            tools = tools.len(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            %source,
            "loaded tools"
        );
        Ok((Arc::clone(tools), source))
    }

    /// Populates the cache ahead of the first turn.
    pub async fn warm_up(&self) -> Result<usize, Error> {
        let (tools, _) = self.resolve().await?;
        Ok(tools.len())
    }

    /// Returns the cached tools without fetching.
    #[inline]
    pub fn cached(&self) -> Option<Arc<[ToolDescriptor]>> {
        self.cell.get().map(Arc::clone)
    }

    /// Returns how many times the provider has been asked for the list.
    #[inline]
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::Relaxed)
    }

    async fn fetch(&self) -> Result<Arc<[ToolDescriptor]>, Error> {
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        match (self.fetch_fn)().await {
            Ok(tools) => Ok(tools.into()),
            Err(err) => {
                warn!("failed to fetch tools: {err}");
                Err(err)
            }
        }
    }
}

impl Debug for ToolCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolCache")
            .field("cached", &self.cell.get().map(|tools| tools.len()))
            .field("fetch_count", &self.fetch_count())
            .finish_non_exhaustive()
    }
}

struct NoProvider;

impl ToolProvider for NoProvider {
    fn fetch_tools(
        &self,
    ) -> impl Future<Output = FetchResult> + Send + 'static {
        std::future::ready(Err(Error::unavailable()
            .with_reason("no tool provider is configured")))
    }
}
