use async_trait::async_trait;

/// A connected, readable device link.
///
/// The contract mirrors a blocking socket read: `read` fills the buffer and
/// resolves to the number of bytes received, with `Ok(0)` meaning
/// end-of-stream. A session takes exclusive ownership of its transport; the
/// read loop is the only reader.
#[async_trait]
pub trait Transport: Send {
    /// Read into `buf`, resolving to the byte count. `Ok(0)` is end-of-stream.
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Remote endpoint in display form, embedded into stage sub-identities.
    fn remote_addr(&self) -> String;
}
