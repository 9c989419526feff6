//! Stream collection for incremental model output.

use futures::stream::BoxStream;
use futures::{Stream, TryStreamExt};

use crate::errors::GenerationError;

/// An ordered stream of text fragments from one model call.
pub type FragmentStream = BoxStream<'static, Result<String, GenerationError>>;

/// Concatenates every fragment in arrival order.
///
/// An empty stream yields an empty string. The first upstream error stops
/// collection and is returned unchanged.
pub async fn collect_stream<S, E>(stream: S) -> Result<String, E>
where
    S: Stream<Item = Result<String, E>>,
{
    collect_stream_with(stream, |_| {}).await
}

/// Like [`collect_stream`], invoking `on_fragment` for each fragment.
pub async fn collect_stream_with<S, E, F>(stream: S, mut on_fragment: F) -> Result<String, E>
where
    S: Stream<Item = Result<String, E>>,
    F: FnMut(&str),
{
    futures::pin_mut!(stream);
    let mut collected = String::new();

    while let Some(fragment) = stream.try_next().await? {
        on_fragment(&fragment);
        collected.push_str(&fragment);
    }

    Ok(collected)
}
