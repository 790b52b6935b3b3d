use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const BUF_SIZE: usize = 16 * 1024;

/// Copies bytes bidirectionally between `a` and `b` until either direction
/// observes EOF or an error; both halves are then considered closed and
/// both byte counts are returned. Errors are terminal but not propagated:
/// the counts are the only observable result, matching the one-shot,
/// best-effort nature of a tunnel forward.
pub async fn pipe<A, B>(a: A, b: B) -> (u64, u64)
where
    A: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    B: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);

    let mut a_to_b = tokio::spawn(async move { copy_loop(&mut a_read, &mut b_write).await });
    let mut b_to_a = tokio::spawn(async move { copy_loop(&mut b_read, &mut a_write).await });

    tokio::select! {
        result = &mut a_to_b => {
            b_to_a.abort();
            let a_to_b_count = result.unwrap_or(0);
            let b_to_a_count = (&mut b_to_a).await.unwrap_or(0);
            (a_to_b_count, b_to_a_count)
        }
        result = &mut b_to_a => {
            a_to_b.abort();
            let b_to_a_count = result.unwrap_or(0);
            let a_to_b_count = (&mut a_to_b).await.unwrap_or(0);
            (a_to_b_count, b_to_a_count)
        }
    }
}

async fn copy_loop<R, W>(r: &mut R, w: &mut W) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; BUF_SIZE];
    let mut total = 0u64;
    loop {
        let n = match r.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        if w.write_all(&buf[..n]).await.is_err() {
            break;
        }
        total += n as u64;
    }
    let _ = w.shutdown().await;
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn counts_bytes_in_both_directions() {
        let (mut a_near, a_far) = duplex(64);
        let (mut b_near, b_far) = duplex(64);

        let pumped = tokio::spawn(pipe(a_far, b_far));

        a_near.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        b_near.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        b_near.write_all(b"world!").await.unwrap();
        let mut buf = [0u8; 6];
        a_near.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"world!");

        drop(a_near);
        drop(b_near);

        let (a_to_b, b_to_a) = pumped.await.unwrap();
        assert_eq!(a_to_b, 5);
        assert_eq!(b_to_a, 6);
    }

    #[tokio::test]
    async fn terminates_on_first_eof() {
        let (a_near, a_far) = duplex(64);
        let (b_near, b_far) = duplex(64);

        drop(a_near);
        let pumped = tokio::spawn(pipe(a_far, b_far));
        drop(b_near);

        let (a_to_b, b_to_a) = pumped.await.unwrap();
        assert_eq!(a_to_b, 0);
        assert_eq!(b_to_a, 0);
    }
}
