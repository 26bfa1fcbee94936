use async_trait::async_trait;
use crate::capability::{Capabilities, CloseListener, Element, SeekOrigin};
use crate::error::{non_negative, Error, Result};

const SKIP_SCRATCH: usize = 4096;

/**
A stream of `T` whose operations suspend rather than block.

Mirrors [crate::capability::Io] method for method, including the defaults: operations outside the reported
[Capabilities] fail with [Error::Unsupported].
*/
#[async_trait]
pub trait AsyncIo<T: Element>: Send {
    fn capabilities(&self) -> Capabilities;
    fn is_closed(&self) -> bool;
    async fn close(&mut self) -> Result<()>;
    fn on_close(&mut self, listener: CloseListener) -> Result<()>;

    async fn read(&mut self, _buf: &mut [T]) -> Result<usize> {
        Err(Error::Unsupported(Capabilities::READ))
    }
    async fn write(&mut self, _buf: &[T]) -> Result<usize> {
        Err(Error::Unsupported(Capabilities::WRITE))
    }
    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
    async fn size(&mut self) -> Result<u64> {
        Err(Error::Unsupported(Capabilities::SIZE))
    }
    async fn position(&mut self) -> Result<u64> {
        Err(Error::Unsupported(Capabilities::SEEK))
    }
    async fn seek(&mut self, _origin: SeekOrigin, _offset: i64) -> Result<u64> {
        Err(Error::Unsupported(Capabilities::SEEK))
    }
    async fn set_size(&mut self, _size: i64) -> Result<()> {
        Err(Error::Unsupported(Capabilities::RESIZE))
    }
    ///Skips at most `count` elements.  Returns how many were skipped, or `None` at the end of the stream.
    async fn skip_up_to(&mut self, count: i64) -> Result<Option<u64>> {
        let count = non_negative(count)?;
        if count == 0 {
            return Ok(Some(0));
        }
        if self.capabilities().contains(Capabilities::SEEK | Capabilities::SIZE) {
            let position = self.position().await?;
            let remaining = self.size().await?.saturating_sub(position);
            if remaining == 0 {
                return Ok(None);
            }
            let skip = count.min(remaining);
            self.seek(SeekOrigin::Start, (position + skip) as i64).await?;
            return Ok(Some(skip));
        }
        let mut scratch = vec![T::default(); count.min(SKIP_SCRATCH as u64) as usize];
        Ok(self.read_or_eof(&mut scratch).await?.map(|n| n as u64))
    }

    async fn read_or_eof(&mut self, buf: &mut [T]) -> Result<Option<usize>> {
        match self.read(buf).await {
            Ok(0) if !buf.is_empty() => Ok(None),
            Ok(n) => Ok(Some(n)),
            Err(Error::EndOfStream) => Ok(None),
            Err(e) => Err(e),
        }
    }
    async fn read_fully(&mut self, buf: &mut [T]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read_or_eof(&mut buf[filled..]).await? {
                Some(n) => filled += n,
                None => return Err(Error::EndOfStream),
            }
        }
        Ok(())
    }
    async fn write_all(&mut self, buf: &[T]) -> Result<()> {
        let mut written = 0;
        while written < buf.len() {
            match self.write(&buf[written..]).await? {
                0 => return Err(Error::EndOfStream),
                n => written += n,
            }
        }
        Ok(())
    }
    async fn skip_fully(&mut self, count: i64) -> Result<()> {
        let mut remaining = non_negative(count)?;
        while remaining > 0 {
            let request = i64::try_from(remaining).unwrap_or(i64::MAX);
            match self.skip_up_to(request).await? {
                Some(0) | None => return Err(Error::EndOfStream),
                Some(n) => remaining -= n,
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Element, I: AsyncIo<T> + ?Sized> AsyncIo<T> for Box<I> {
    fn capabilities(&self) -> Capabilities { (**self).capabilities() }
    fn is_closed(&self) -> bool { (**self).is_closed() }
    async fn close(&mut self) -> Result<()> { (**self).close().await }
    fn on_close(&mut self, listener: CloseListener) -> Result<()> { (**self).on_close(listener) }
    async fn read(&mut self, buf: &mut [T]) -> Result<usize> { (**self).read(buf).await }
    async fn write(&mut self, buf: &[T]) -> Result<usize> { (**self).write(buf).await }
    async fn flush(&mut self) -> Result<()> { (**self).flush().await }
    async fn size(&mut self) -> Result<u64> { (**self).size().await }
    async fn position(&mut self) -> Result<u64> { (**self).position().await }
    async fn seek(&mut self, origin: SeekOrigin, offset: i64) -> Result<u64> { (**self).seek(origin, offset).await }
    async fn set_size(&mut self, size: i64) -> Result<()> { (**self).set_size(size).await }
    async fn skip_up_to(&mut self, count: i64) -> Result<Option<u64>> { (**self).skip_up_to(count).await }
}

///Resolves a child's size: directly if it knows it, otherwise by seeking to its end and back.
pub(crate) async fn resolve_size<T: Element, I: AsyncIo<T> + ?Sized>(io: &mut I) -> Result<u64> {
    let capabilities = io.capabilities();
    if capabilities.contains(Capabilities::SIZE) {
        io.size().await
    }
    else if capabilities.contains(Capabilities::SEEK) {
        let position = io.position().await?;
        let end = io.seek(SeekOrigin::End, 0).await?;
        io.seek(SeekOrigin::Start, position as i64).await?;
        Ok(end)
    }
    else {
        Err(Error::Unsupported(Capabilities::SIZE))
    }
}
