use std::sync::mpsc::{channel, Receiver, Sender};

/// Message tag used by all collectives; point-to-point traffic picks its own tags
pub const TAG_COLLECTIVE: u16 = u16::MAX;

type Envelope = (usize, u16, Vec<f64>);

/// Builds the channel mesh connecting a fixed set of ranks.
///
/// Every rank owns one receiver and a sender clone towards every other rank.
/// The returned handles are meant to be moved into one thread each; the
/// simulation binary spawns them under `std::thread::scope`.
pub struct Mesh;

impl Mesh {
    pub fn build(nprocs: usize) -> Vec<Rank> {
        let mut senders: Vec<Sender<Envelope>> = Vec::with_capacity(nprocs);
        let mut receivers: Vec<Receiver<Envelope>> = Vec::with_capacity(nprocs);
        for _ in 0..nprocs {
            let (tx, rx) = channel();
            senders.push(tx);
            receivers.push(rx);
        }
        receivers
            .into_iter()
            .enumerate()
            .map(|(me, inbox)| Rank {
                me,
                nprocs,
                peers: senders.clone(),
                inbox,
                stash: Vec::new(),
            })
            .collect()
    }
}

/// One rank's endpoint of the mesh.
///
/// `send` never blocks; `recv` blocks until a message from the requested
/// source with the requested tag arrives. Messages that arrive out of order
/// are stashed and matched later, while the per-sender channel order keeps
/// same-source same-tag messages sequenced. Collectives are gather-to-rank-0
/// followed by a broadcast of the result; they must be entered by every rank
/// in the same global order.
pub struct Rank {
    me: usize,
    nprocs: usize,
    peers: Vec<Sender<Envelope>>,
    inbox: Receiver<Envelope>,
    stash: Vec<Envelope>,
}

impl Rank {
    #[inline(always)]
    pub fn me(&self) -> usize {
        self.me
    }

    #[inline(always)]
    pub fn nprocs(&self) -> usize {
        self.nprocs
    }

    /// Posts a message towards another rank; ownership of the payload moves
    /// with the message
    pub fn send(&self, dst: usize, tag: u16, data: Vec<f64>) {
        self.peers[dst]
            .send((self.me, tag, data))
            .expect("rank mesh closed before the run finished");
    }

    /// Receives the next message from `src` carrying `tag`
    pub fn recv(&mut self, src: usize, tag: u16) -> Vec<f64> {
        if let Some(pos) = self
            .stash
            .iter()
            .position(|(s, t, _)| *s == src && *t == tag)
        {
            return self.stash.remove(pos).2;
        }
        loop {
            let envelope = self
                .inbox
                .recv()
                .expect("rank mesh closed before the run finished");
            if envelope.0 == src && envelope.1 == tag {
                return envelope.2;
            }
            self.stash.push(envelope);
        }
    }

    /// Element-wise sum of a vector over all ranks; every rank gets the total
    pub fn sum_vec(&mut self, mut xs: Vec<f64>) -> Vec<f64> {
        if self.nprocs == 1 {
            return xs;
        }
        if self.me == 0 {
            for src in 1..self.nprocs {
                let part = self.recv(src, TAG_COLLECTIVE);
                for (a, b) in xs.iter_mut().zip(part.iter()) {
                    *a += *b;
                }
            }
            for dst in 1..self.nprocs {
                self.send(dst, TAG_COLLECTIVE, xs.clone());
            }
            xs
        } else {
            self.send(0, TAG_COLLECTIVE, xs);
            self.recv(0, TAG_COLLECTIVE)
        }
    }

    /// Sum of a scalar over all ranks
    pub fn sum(&mut self, x: f64) -> f64 {
        self.sum_vec(vec![x])[0]
    }

    /// Sum of a counter over all ranks
    pub fn sum_usize(&mut self, n: usize) -> usize {
        self.sum(n as f64).round() as usize
    }

    /// Maximum of a scalar over all ranks
    pub fn max(&mut self, x: f64) -> f64 {
        if self.nprocs == 1 {
            return x;
        }
        if self.me == 0 {
            let mut best = x;
            for src in 1..self.nprocs {
                let part = self.recv(src, TAG_COLLECTIVE);
                best = best.max(part[0]);
            }
            for dst in 1..self.nprocs {
                self.send(dst, TAG_COLLECTIVE, vec![best]);
            }
            best
        } else {
            self.send(0, TAG_COLLECTIVE, vec![x]);
            self.recv(0, TAG_COLLECTIVE)[0]
        }
    }

    /// True on every rank when the flag is raised on at least one of them
    pub fn any(&mut self, flag: bool) -> bool {
        self.sum(if flag { 1.0 } else { 0.0 }) > 0.5
    }

    /// Hands rank 0's payload to every rank
    pub fn broadcast(&mut self, data: Vec<f64>) -> Vec<f64> {
        if self.nprocs == 1 {
            return data;
        }
        if self.me == 0 {
            for dst in 1..self.nprocs {
                self.send(dst, TAG_COLLECTIVE, data.clone());
            }
            data
        } else {
            self.recv(0, TAG_COLLECTIVE)
        }
    }

    /// Blocks until every rank arrives
    pub fn barrier(&mut self) {
        self.sum(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn on_ranks<F>(nprocs: usize, body: F) -> Vec<Vec<f64>>
    where
        F: Fn(&mut Rank) -> Vec<f64> + Sync,
    {
        let ranks = Mesh::build(nprocs);
        let body = &body;
        thread::scope(|scope| {
            let handles: Vec<_> = ranks
                .into_iter()
                .map(|mut rank| scope.spawn(move || body(&mut rank)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    #[test]
    fn point_to_point_test() {
        let results = on_ranks(2, |rank| {
            if rank.me() == 0 {
                rank.send(1, 7, vec![1.0, 2.0]);
                rank.recv(1, 7)
            } else {
                let got = rank.recv(0, 7);
                rank.send(0, 7, vec![got[0] + got[1]]);
                got
            }
        });
        assert_eq!(results[0], vec![3.0]);
        assert_eq!(results[1], vec![1.0, 2.0]);
    }

    #[test]
    fn out_of_order_matching_test() {
        let results = on_ranks(3, |rank| match rank.me() {
            0 => {
                // receive from 2 first even though 1's message likely lands earlier
                let a = rank.recv(2, 5);
                let b = rank.recv(1, 5);
                vec![a[0], b[0]]
            }
            me => {
                rank.send(0, 5, vec![me as f64]);
                vec![]
            }
        });
        assert_eq!(results[0], vec![2.0, 1.0]);
    }

    #[test]
    fn collectives_test() {
        let results = on_ranks(4, |rank| {
            let total = rank.sum(rank.me() as f64 + 1.0);
            let top = rank.max(rank.me() as f64);
            let nobody = rank.any(false);
            let somebody = rank.any(rank.me() == 2);
            let seed = rank.broadcast(if rank.me() == 0 {
                vec![42.0]
            } else {
                Vec::new()
            });
            rank.barrier();
            vec![
                total,
                top,
                if nobody { 1.0 } else { 0.0 },
                if somebody { 1.0 } else { 0.0 },
                seed[0],
            ]
        });
        for r in results {
            assert_eq!(r, vec![10.0, 3.0, 0.0, 1.0, 42.0]);
        }
    }
}
