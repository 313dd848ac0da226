//! Exchange of queries and responses through files in a shared directory.
//!
//! The client writes `<scheme>_query_to_server_<k>` for every server `k`, each server answers
//! with `<scheme>_response_from_server_<k>`. Queries use the canonical encoding of their type and
//! responses are the raw response bytes.
use ark_serialize::{CanonicalDeserialize as Deserialize, CanonicalSerialize as Serialize};
use std::{
    fmt,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::trace;

use crate::Result;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Scheme {
    /// Two-server Chor scheme
    Chor,
    /// Two-server Boyle scheme over a one-bit DPF
    Boyle,
    /// BitMore with a power-of-two number of servers
    BitMorePow2,
    /// BitMore with any other number of servers
    BitMoreNonPow2,
    /// Plain BitMore with random digits
    PlainBitMore,
}

impl Scheme {
    pub const ALL: [Scheme; 5] = [
        Scheme::Chor,
        Scheme::Boyle,
        Scheme::BitMorePow2,
        Scheme::BitMoreNonPow2,
        Scheme::PlainBitMore,
    ];

    /// Prefix of every file exchanged by the scheme
    pub fn prefix(&self) -> &'static str {
        match self {
            Scheme::Chor => "p_chor",
            Scheme::Boyle => "c_boyle",
            Scheme::BitMorePow2 => "c_bm_p2",
            Scheme::BitMoreNonPow2 => "c_bm_np2",
            Scheme::PlainBitMore => "p_bm_np2",
        }
    }

    /// The BitMore variant for `nservers` servers
    pub fn bitmore(nservers: usize) -> Self {
        if nservers.is_power_of_two() {
            Scheme::BitMorePow2
        } else {
            Scheme::BitMoreNonPow2
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Serialises `msg` into a new file at `path`
pub fn write_message<T: Serialize>(path: &Path, msg: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    msg.serialize(&mut writer)?;
    writer.flush()?;
    trace!(path = %path.display(), bytes = msg.serialized_size(), "wrote message");
    Ok(())
}

/// Deserialises a message of type `T` from the file at `path`
pub fn read_message<T: Deserialize>(path: &Path) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    let msg = T::deserialize(reader)?;
    trace!(path = %path.display(), "read message");
    Ok(msg)
}

/// Files for every scheme and server, kept in one directory
#[derive(Clone, Debug)]
pub struct FileTransport {
    dir: PathBuf,
}

impl FileTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn query_path(&self, scheme: Scheme, server: usize) -> PathBuf {
        self.dir
            .join(format!("{}_query_to_server_{}", scheme.prefix(), server))
    }

    pub fn response_path(&self, scheme: Scheme, server: usize) -> PathBuf {
        self.dir
            .join(format!("{}_response_from_server_{}", scheme.prefix(), server))
    }

    pub fn send_query<T: Serialize>(&self, scheme: Scheme, server: usize, query: &T) -> Result<()> {
        write_message(&self.query_path(scheme, server), query)
    }

    pub fn recv_query<T: Deserialize>(&self, scheme: Scheme, server: usize) -> Result<T> {
        read_message(&self.query_path(scheme, server))
    }

    pub fn send_response(&self, scheme: Scheme, server: usize, response: &[u8]) -> Result<()> {
        let path = self.response_path(scheme, server);
        std::fs::write(&path, response)?;
        trace!(path = %path.display(), bytes = response.len(), "wrote response");
        Ok(())
    }

    pub fn recv_response(&self, scheme: Scheme, server: usize) -> Result<Vec<u8>> {
        let path = self.response_path(scheme, server);
        let response = std::fs::read(&path)?;
        trace!(path = %path.display(), bytes = response.len(), "read response");
        Ok(response)
    }

    /// The responses of servers `0..nservers`, in order
    pub fn recv_responses(&self, scheme: Scheme, nservers: usize) -> Result<Vec<Vec<u8>>> {
        (0..nservers)
            .map(|server| self.recv_response(scheme, server))
            .collect()
    }
}
