/// The protocol a `Server` resource declares for a `(pod, port)`, as consumed
/// by the endpoint and endpoint-profile translators to decide the
/// `opaqueProtocol` bit.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Protocol {
    Opaque,
    Discovered,
    /// No `Server` selects this pod/port.
    #[default]
    None,
}

impl Protocol {
    pub fn is_opaque(self) -> bool {
        matches!(self, Self::Opaque)
    }
}
