use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, error};
use parking_lot::Mutex;

use crate::decoder::ModelDecoder;
use crate::ifc::DecodeError;
use crate::scene::RenderableObject;

/// In-memory model file waiting to be decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSource {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl FileSource {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Result of decoding one file.
#[derive(Debug)]
pub struct LoadOutcome {
    /// Position of the request among everything this loader was asked to load.
    pub sequence: usize,
    pub name: String,
    pub result: Result<RenderableObject, DecodeError>,
}

type CompletionQueue = Arc<Mutex<VecDeque<LoadOutcome>>>;

/// Decodes model files off the frame loop and queues the results.
///
/// Every request completes independently; the frame loop collects finished
/// work with [`ModelLoader::drain`] in completion order.
#[derive(Clone)]
pub struct ModelLoader {
    decoder: Arc<dyn ModelDecoder>,
    queue: CompletionQueue,
    state: Arc<Mutex<LoaderState>>,
}

#[derive(Default)]
struct LoaderState {
    next_sequence: usize,
    in_flight: usize,
    #[cfg(not(target_arch = "wasm32"))]
    workers: Vec<std::thread::JoinHandle<()>>,
}

impl ModelLoader {
    pub fn new(decoder: Arc<dyn ModelDecoder>) -> Self {
        Self {
            decoder,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            state: Arc::new(Mutex::new(LoaderState::default())),
        }
    }

    /// Takes every outcome completed so far.
    pub fn drain(&self) -> Vec<LoadOutcome> {
        self.queue.lock().drain(..).collect()
    }

    /// Number of requests that have not completed yet.
    pub fn pending(&self) -> usize {
        self.state.lock().in_flight
    }

    fn begin(&self) -> usize {
        let mut state = self.state.lock();
        state.in_flight += 1;
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        sequence
    }

    fn complete(queue: &CompletionQueue, state: &Mutex<LoaderState>, outcome: LoadOutcome) {
        match &outcome.result {
            Ok(object) => debug!("decoded {} ({} parts)", outcome.name, object.parts.len()),
            Err(err) => error!("failed to load {}: {err}", outcome.name),
        }
        queue.lock().push_back(outcome);
        let mut state = state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
    }

    fn decode(decoder: &dyn ModelDecoder, sequence: usize, source: FileSource) -> LoadOutcome {
        let result = decoder.decode(&source.name, &source.bytes);
        LoadOutcome {
            sequence,
            name: source.name,
            result,
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::thread;

    use log::warn;

    use super::{FileSource, LoadOutcome, ModelLoader};
    use crate::ifc::DecodeError;

    impl ModelLoader {
        /// Decodes each source on its own worker thread.
        pub fn load_sources(&self, sources: Vec<FileSource>) {
            for source in sources {
                let sequence = self.begin();
                let name = source.name.clone();
                self.spawn(sequence, name, move || Ok(source));
            }
        }

        /// Reads and decodes each file on its own worker thread.
        pub fn load_paths(&self, paths: Vec<PathBuf>) {
            for path in paths {
                let sequence = self.begin();
                let name = display_name(&path);
                let file_name = name.clone();
                self.spawn(sequence, name, move || {
                    std::fs::read(&path)
                        .map(|bytes| FileSource::new(file_name, bytes))
                        .map_err(|source| DecodeError::Io {
                            path: path.display().to_string(),
                            source,
                        })
                });
            }
        }

        /// Blocks until every worker started so far has finished.
        pub fn wait(&self) {
            let workers: Vec<_> = self.state.lock().workers.drain(..).collect();
            for worker in workers {
                if worker.join().is_err() {
                    warn!("model decode worker panicked");
                }
            }
        }

        fn spawn<F>(&self, sequence: usize, name: String, read: F)
        where
            F: FnOnce() -> Result<FileSource, DecodeError> + Send + 'static,
        {
            let decoder = Arc::clone(&self.decoder);
            let queue = Arc::clone(&self.queue);
            let state = Arc::clone(&self.state);
            let thread_name = format!("decode-{sequence}");
            let worker_name = name.clone();
            let spawned = thread::Builder::new().name(thread_name).spawn(move || {
                let outcome = match read() {
                    Ok(source) => ModelLoader::decode(decoder.as_ref(), sequence, source),
                    Err(err) => LoadOutcome {
                        sequence,
                        name: worker_name,
                        result: Err(err),
                    },
                };
                ModelLoader::complete(&queue, &state, outcome);
            });
            match spawned {
                Ok(handle) => self.state.lock().workers.push(handle),
                Err(err) => {
                    let outcome = LoadOutcome {
                        sequence,
                        name: name.clone(),
                        result: Err(DecodeError::Io { path: name, source: err }),
                    };
                    ModelLoader::complete(&self.queue, &self.state, outcome);
                }
            }
        }
    }

    fn display_name(path: &std::path::Path) -> String {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    }
}

#[cfg(target_arch = "wasm32")]
mod web {
    use js_sys::Uint8Array;
    use wasm_bindgen_futures::{spawn_local, JsFuture};
    use web_sys::{File, FileList};

    use super::{FileSource, LoadOutcome, ModelLoader};
    use crate::ifc::DecodeError;

    impl ModelLoader {
        /// Decodes in-memory sources as browser tasks.
        pub fn load_sources(&self, sources: Vec<FileSource>) {
            for source in sources {
                let sequence = self.begin();
                let loader = self.clone();
                spawn_local(async move {
                    let outcome = ModelLoader::decode(loader.decoder.as_ref(), sequence, source);
                    ModelLoader::complete(&loader.queue, &loader.state, outcome);
                });
            }
        }

        /// Reads every selected file and decodes it as a browser task.
        pub fn load_web_files(&self, files: &FileList) {
            for index in 0..files.length() {
                let Some(file) = files.get(index) else {
                    continue;
                };
                let sequence = self.begin();
                let loader = self.clone();
                spawn_local(async move {
                    let name = file.name();
                    let outcome = match read_file(&file).await {
                        Ok(bytes) => ModelLoader::decode(
                            loader.decoder.as_ref(),
                            sequence,
                            FileSource::new(name, bytes),
                        ),
                        Err(err) => LoadOutcome {
                            sequence,
                            name,
                            result: Err(err),
                        },
                    };
                    ModelLoader::complete(&loader.queue, &loader.state, outcome);
                });
            }
        }
    }

    async fn read_file(file: &File) -> Result<Vec<u8>, DecodeError> {
        let buffer = JsFuture::from(file.array_buffer())
            .await
            .map_err(|err| DecodeError::Io {
                path: file.name(),
                source: std::io::Error::new(std::io::ErrorKind::Other, format!("{err:?}")),
            })?;
        Ok(Uint8Array::new(&buffer).to_vec())
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::scene::MeshPart;

    struct FakeDecoder;

    impl ModelDecoder for FakeDecoder {
        fn decode(&self, name: &str, bytes: &[u8]) -> Result<RenderableObject, DecodeError> {
            if bytes.starts_with(b"ok") {
                Ok(RenderableObject::new(name, Vec::<MeshPart>::new()))
            } else {
                Err(DecodeError::NotStep)
            }
        }
    }

    fn loader() -> ModelLoader {
        ModelLoader::new(Arc::new(FakeDecoder))
    }

    #[test]
    fn every_source_completes_independently() {
        let loader = loader();
        loader.load_sources(vec![
            FileSource::new("a.ifc", b"ok".to_vec()),
            FileSource::new("broken.ifc", b"nope".to_vec()),
            FileSource::new("c.ifc", b"ok".to_vec()),
        ]);
        loader.wait();
        assert_eq!(loader.pending(), 0);

        let mut outcomes = loader.drain();
        outcomes.sort_by_key(|o| o.sequence);
        let names: Vec<_> = outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, ["a.ifc", "broken.ifc", "c.ifc"]);
        assert!(outcomes[0].result.is_ok());
        assert!(outcomes[1].result.is_err());
        assert!(outcomes[2].result.is_ok());
        assert!(loader.drain().is_empty());
    }

    #[test]
    fn missing_path_reports_io_error() {
        let loader = loader();
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"ok").unwrap();
        loader.load_paths(vec![file.path().to_path_buf(), "/definitely/missing.ifc".into()]);
        loader.wait();

        let mut outcomes = loader.drain();
        outcomes.sort_by_key(|o| o.sequence);
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].result.is_ok());
        assert_eq!(outcomes[1].name, "missing.ifc");
        assert!(matches!(outcomes[1].result, Err(DecodeError::Io { .. })));
    }

    #[test]
    fn clones_share_the_queue() {
        let loader = loader();
        let clone = loader.clone();
        clone.load_sources(vec![FileSource::new("a.ifc", b"ok".to_vec())]);
        clone.wait();
        assert_eq!(loader.drain().len(), 1);
    }
}
