//! Small `Stream` combinators sitting between the k8s-index watch channels
//! and the destination server's translators (§4.5, §4.6).

pub mod fallback;
pub mod opaque_ports;
