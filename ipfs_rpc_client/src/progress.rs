use std::sync::Arc;

use futures::StreamExt;

use crate::backend::RequestBody;

/// Cumulative upload progress for one request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub loaded: u64,
    /// `None` when the body length is not known up front (streams, multipart).
    pub total: Option<u64>,
}

impl UploadProgress {
    pub fn length_computable(&self) -> bool {
        self.total.is_some()
    }
}

pub type ProgressFn = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// Reports every chunk of `body` to `on_progress` as it is handed to the
/// HTTP client.
pub fn track_upload(body: RequestBody, on_progress: ProgressFn) -> RequestBody {
    let total = body.known_len();
    let mut loaded = 0u64;
    let stream = body.into_stream().inspect(move |chunk| {
        if let Ok(chunk) = chunk {
            loaded += chunk.len() as u64;
            on_progress(UploadProgress { loaded, total });
        }
    });
    RequestBody::Stream(stream.boxed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::{TryStreamExt, stream};
    use std::sync::Mutex;

    fn recorder() -> (ProgressFn, Arc<Mutex<Vec<UploadProgress>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let f: ProgressFn = Arc::new(move |p| sink.lock().unwrap().push(p));
        (f, seen)
    }

    #[tokio::test]
    async fn known_length_is_computable() {
        let (f, seen) = recorder();
        let body = track_upload(RequestBody::from(vec![0u8; 10]), f);
        let _: Vec<Bytes> = body.into_stream().try_collect().await.unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![UploadProgress {
                loaded: 10,
                total: Some(10)
            }]
        );
        assert!(seen[0].length_computable());
    }

    #[tokio::test]
    async fn streamed_body_is_indeterminate_and_cumulative() {
        let (f, seen) = recorder();
        let chunks = stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"de")),
        ])
        .boxed();
        let body = track_upload(RequestBody::Stream(chunks), f);
        let _: Vec<Bytes> = body.into_stream().try_collect().await.unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.iter().map(|p| p.loaded).collect::<Vec<_>>(), vec![3, 5]);
        assert!(seen.iter().all(|p| !p.length_computable()));
    }
}
