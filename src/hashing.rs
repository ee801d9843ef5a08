use std::io::{self, BufRead, Write};

use rug::{integer::Order, Integer};
use sha2::{Digest, Sha512};

use crate::elgamal::Ciphertext;
use crate::group::Element;
use crate::group::Group;
use crate::shuffler::{TValues, YChallengeInput};

/// SHA-512 digest, the fingerprint of every artifact on the board.
pub type Hash = [u8; 64];

pub trait HashBytes {
    fn get_bytes(&self) -> Vec<u8>;
}

/// Maps arbitrary bytes into a target domain (exponents or group
/// elements), used to derive proof challenges and generators.
pub trait HashTo<T>: Send + Sync {
    fn hash_to(&self, bytes: &[u8]) -> T;
}

impl HashBytes for Integer {
    fn get_bytes(&self) -> Vec<u8> {
        self.to_digits::<u8>(Order::LsfLe)
    }
}

impl<E: Element + HashBytes> HashBytes for Ciphertext<E> {
    fn get_bytes(&self) -> Vec<u8> {
        let mut ret = self.a.get_bytes();
        ret.extend_from_slice(&self.b.get_bytes());

        ret
    }
}

fn concat_bytes_iter<'a, H: 'a + HashBytes, I: IntoIterator<Item = &'a H>>(cs: I) -> Vec<u8> {
    cs.into_iter().map(|x| x.get_bytes()).fold(vec![], |mut a, b| {
        a.extend(b);
        a
    })
}

fn concat_bytes<T: HashBytes>(cs: &[T]) -> Vec<u8> {
    concat_bytes_iter(cs)
}

pub fn hash_bytes(bytes: &[u8]) -> Hash {
    let mut hasher = Sha512::new();
    hasher.update(bytes);
    let mut ret = [0u8; 64];
    ret.copy_from_slice(hasher.finalize().as_slice());

    ret
}

pub fn hash<T: HashBytes>(data: &T) -> Hash {
    hash_bytes(&data.get_bytes())
}

/// Digest over an ordered list of hashes, used to bind a set of
/// per-trustee artifacts (shares, partial decryptions) into one value.
pub fn combine_hashes(hashes: &[Hash]) -> Hash {
    let mut hasher = Sha512::new();
    for h in hashes {
        hasher.update(h);
    }
    let mut ret = [0u8; 64];
    ret.copy_from_slice(hasher.finalize().as_slice());

    ret
}

/// Tees everything written through it into a SHA-512 digest, so the
/// hash of a large artifact is obtained while emitting it.
pub struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha512,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> HashingWriter<W> {
        HashingWriter {
            inner,
            hasher: Sha512::new(),
        }
    }

    pub fn finish(self) -> (W, Hash) {
        let mut ret = [0u8; 64];
        ret.copy_from_slice(self.hasher.finalize().as_slice());

        (self.inner, ret)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);

        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Line-oriented counterpart of [`HashingWriter`]: consuming the same
/// bytes yields the same digest the writer produced.
pub struct HashingLineReader<R: BufRead> {
    inner: R,
    hasher: Sha512,
}

impl<R: BufRead> HashingLineReader<R> {
    pub fn new(inner: R) -> HashingLineReader<R> {
        HashingLineReader {
            inner,
            hasher: Sha512::new(),
        }
    }

    /// Next line with the trailing newline stripped, or None at eof.
    pub fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        let n = self.inner.read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        self.hasher.update(line.as_bytes());
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }

        Ok(Some(line))
    }

    pub fn finish(self) -> Hash {
        let mut ret = [0u8; 64];
        ret.copy_from_slice(self.hasher.finalize().as_slice());

        ret
    }
}

pub fn shuffle_proof_us<E: Element>(
    es: &[Ciphertext<E>],
    e_primes: &[Ciphertext<E>],
    cs: &[E],
    exp_hasher: &dyn HashTo<E::Exp>,
    n: usize,
) -> Vec<E::Exp> {
    let mut prefix_vector = concat_bytes(es);
    prefix_vector.extend(concat_bytes(e_primes));
    prefix_vector.extend(concat_bytes(cs));
    let prefix = prefix_vector.as_slice();
    let mut ret = Vec::with_capacity(n);

    for i in 0..n {
        let next_bytes: Vec<u8> = [prefix, i.to_le_bytes().as_slice()].concat();
        let u: E::Exp = exp_hasher.hash_to(&next_bytes);
        ret.push(u);
    }

    ret
}

pub fn shuffle_proof_challenge<E: Element, G: Group<E>>(
    y: &YChallengeInput<E, G>,
    t: &TValues<E>,
    exp_hasher: &dyn HashTo<E::Exp>,
) -> E::Exp {
    let mut bytes = concat_bytes(y.es);
    bytes.extend(concat_bytes(y.e_primes));
    bytes.extend(concat_bytes(y.cs));
    bytes.extend(concat_bytes(y.c_hats));
    bytes.extend(y.pk.value.get_bytes());

    bytes.extend(t.t1.get_bytes());
    bytes.extend(t.t2.get_bytes());
    bytes.extend(t.t3.get_bytes());
    bytes.extend(t.t4_1.get_bytes());
    bytes.extend(t.t4_2.get_bytes());
    bytes.extend(concat_bytes(&t.t_hats));

    exp_hasher.hash_to(&bytes)
}

/// Schnorr challenge, bound to a caller-supplied proof domain label
/// (trustees use their RSA modulus).
pub fn schnorr_proof_challenge<E: Element>(
    g: &E,
    public: &E,
    commitment: &E,
    label: &[u8],
    exp_hasher: &dyn HashTo<E::Exp>,
) -> E::Exp {
    let mut bytes = concat_bytes_iter([g, public, commitment]);
    bytes.extend_from_slice(label);

    exp_hasher.hash_to(&bytes)
}

pub fn cp_proof_challenge<E: Element>(
    g1: &E,
    g2: &E,
    public1: &E,
    public2: &E,
    commitment1: &E,
    commitment2: &E,
    exp_hasher: &dyn HashTo<E::Exp>,
) -> E::Exp {
    let values = [g1, g2, public1, public2, commitment1, commitment2];
    let bytes = concat_bytes_iter(values);

    exp_hasher.hash_to(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_streaming_matches_whole_buffer() {
        let data = b"first line\nsecond line\nthird\n";
        let whole = hash_bytes(data);

        let mut writer = HashingWriter::new(Vec::new());
        writer.write_all(b"first line\n").unwrap();
        writer.write_all(b"second line\n").unwrap();
        writer.write_all(b"third\n").unwrap();
        let (bytes, streamed) = writer.finish();

        assert_eq!(bytes.as_slice(), data.as_slice());
        assert_eq!(whole, streamed);

        let mut reader = HashingLineReader::new(data.as_slice());
        assert_eq!(reader.next_line().unwrap().unwrap(), "first line");
        assert_eq!(reader.next_line().unwrap().unwrap(), "second line");
        assert_eq!(reader.next_line().unwrap().unwrap(), "third");
        assert!(reader.next_line().unwrap().is_none());
        assert_eq!(reader.finish(), whole);
    }

    #[test]
    fn test_combine_hashes_order_sensitive() {
        let a = hash_bytes(b"a");
        let b = hash_bytes(b"b");
        assert_ne!(combine_hashes(&[a, b]), combine_hashes(&[b, a]));
        assert_eq!(combine_hashes(&[a, b]), combine_hashes(&[a, b]));
    }
}
