use crate::{
    config::{ModelConfig, Validatable},
    model_service::{Classifier, ClassifierError},
    preprocessing::{ImageTensor, CHANNELS},
};
use ndarray::{ArrayViewD, Axis};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::path::Path;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex, PoisonError,
};

fn build_session(path: &Path) -> Result<Session, ort::Error> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(1)?
        .commit_from_file(path)?;
    Ok(session)
}

/// ONNX Runtime backed classifier expecting NHWC float input.
///
/// Sessions are created once at startup and handed out round-robin; each one
/// sits behind its own mutex because running a session needs exclusive access.
pub struct OrtClassifier {
    sessions: Vec<Mutex<Session>>,
    counter: AtomicUsize,
    input_shape: [usize; 4],
}

impl OrtClassifier {
    pub fn new(model_config: &ModelConfig) -> Result<Self, ClassifierError> {
        let path = model_config.get_path();
        if model_config.validate().is_err() {
            return Err(ClassifierError::ModelNotFound(path));
        }

        let num_instances = model_config.num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| {
                build_session(&path)
                    .map(Mutex::new)
                    .map_err(|source| ClassifierError::LoadFailure {
                        path: path.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, ClassifierError>>()?;

        tracing::info!("Created {} ONNX sessions from {:?}", num_instances, path);

        Ok(Self {
            sessions,
            counter: AtomicUsize::new(0),
            input_shape: [
                1,
                model_config.input_height as usize,
                model_config.input_width as usize,
                CHANNELS,
            ],
        })
    }
}

impl Classifier for OrtClassifier {
    fn input_shape(&self) -> [usize; 4] {
        self.input_shape
    }

    fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>, ClassifierError> {
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.sessions.len();

        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.as_standard_layout().to_owned();
            owned_buffer.view()
        };
        let tensor_ref = TensorRef::from_array_view(input_view)?;

        // A session holds no per-request state, so a poisoned lock is still usable.
        let mut session = self.sessions[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        tracing::debug!("Handling request with session {}", index);

        let outputs = session.run(ort::inputs![tensor_ref])?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        first_batch_scores(ArrayViewD::from_shape(shape.to_ixdyn(), data)?)
    }
}

/// Scores of the first image in a `[batch, classes...]` output.
fn first_batch_scores(output: ArrayViewD<'_, f32>) -> Result<Vec<f32>, ClassifierError> {
    if output.ndim() == 0 || output.len_of(Axis(0)) == 0 {
        return Err(ClassifierError::EmptyScores);
    }

    Ok(output.index_axis(Axis(0), 0).iter().copied().collect())
}
