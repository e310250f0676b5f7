pub mod best_frame;
pub mod change_gate;
pub mod correlate;
pub mod counter;
pub mod preprocess;
pub mod recognizer;
pub mod region;
pub mod text_reader;

pub use best_frame::{select_best, select_most_confident, select_sharpest, CandidateReading, SharpestCrop};
pub use change_gate::{changed, diff_score, ChangeGate, DEFAULT_DIFF_THRESHOLD};
pub use counter::{CounterDecoder, CounterReading, DecoderConfig, GlyphTemplates};
pub use preprocess::{PreprocessConfig, PREPROCESS_LABEL};
pub use recognizer::{
    NullRecognizer, Recognition, RecognizerRegistry, SelectedRecognizer, TesseractCli,
    TextRecognizer,
};
pub use region::{names, RegionDefinition, RegionExtractor, RegionProfile};
pub use text_reader::{read_queue, read_selection, QueueText, SelectionText};
