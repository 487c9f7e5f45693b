pub mod agent;
pub mod live;

pub use live::{
    Blob, Content, InputSink, LiveEvent, LiveEventStream, LiveRequest, LiveRequestQueue,
    LiveRunner, LiveSession, Modality, Part, QueueClosed, Role,
};
