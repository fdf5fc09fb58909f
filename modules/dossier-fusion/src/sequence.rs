//! Ratcliff/Obershelp sequence matching: anchor on the longest common block,
//! then match the pieces on either side of it the same way.
//!
//! The ratio is `2·M / T` where `M` is the number of matched characters and
//! `T` the combined length. It is not symmetric: ties between equally long
//! blocks resolve toward the earliest position in `a`.

use std::collections::HashMap;

/// From this length of `b` on, characters making up more than 1% of it are
/// not used as match anchors.
const POPULAR_MIN_LEN: usize = 200;

/// Similarity of `a` to `b` in [0, 1]. Two empty strings are identical.
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matcher = Matcher::new(&a, &b);
    2.0 * matcher.matched_chars() as f64 / total as f64
}

struct Matcher<'a> {
    a: &'a [char],
    b: &'a [char],
    /// Positions of each anchor character in `b`, ascending.
    b_positions: HashMap<char, Vec<usize>>,
}

/// A common run: `a[i..i + size] == b[j..j + size]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Block {
    i: usize,
    j: usize,
    size: usize,
}

impl<'a> Matcher<'a> {
    fn new(a: &'a [char], b: &'a [char]) -> Self {
        let mut b_positions: HashMap<char, Vec<usize>> = HashMap::new();
        for (j, &ch) in b.iter().enumerate() {
            b_positions.entry(ch).or_default().push(j);
        }
        if b.len() >= POPULAR_MIN_LEN {
            let limit = b.len() / 100 + 1;
            b_positions.retain(|_, positions| positions.len() <= limit);
        }
        Self { a, b, b_positions }
    }

    fn matched_chars(&self) -> usize {
        let mut matched = 0;
        let mut pending = vec![(0, self.a.len(), 0, self.b.len())];
        while let Some((alo, ahi, blo, bhi)) = pending.pop() {
            let block = self.longest_match(alo, ahi, blo, bhi);
            if block.size == 0 {
                continue;
            }
            matched += block.size;
            if alo < block.i && blo < block.j {
                pending.push((alo, block.i, blo, block.j));
            }
            if block.i + block.size < ahi && block.j + block.size < bhi {
                pending.push((block.i + block.size, ahi, block.j + block.size, bhi));
            }
        }
        matched
    }

    /// Longest block inside `a[alo..ahi]` × `b[blo..bhi]`, earliest in `a`
    /// (then in `b`) on ties.
    fn longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> Block {
        let mut best = Block { i: alo, j: blo, size: 0 };
        // run_ending_at[j] = length of the common run ending at a[i - 1], b[j]
        let mut run_ending_at: HashMap<usize, usize> = HashMap::new();
        for i in alo..ahi {
            let mut next: HashMap<usize, usize> = HashMap::new();
            if let Some(positions) = self.b_positions.get(&self.a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let previous = j
                        .checked_sub(1)
                        .and_then(|p| run_ending_at.get(&p).copied())
                        .unwrap_or(0);
                    let size = previous + 1;
                    next.insert(j, size);
                    if size > best.size {
                        best = Block {
                            i: i + 1 - size,
                            j: j + 1 - size,
                            size,
                        };
                    }
                }
            }
            run_ending_at = next;
        }

        // Popular characters never anchor a block but may still extend one.
        while best.i > alo && best.j > blo && self.a[best.i - 1] == self.b[best.j - 1] {
            best.i -= 1;
            best.j -= 1;
            best.size += 1;
        }
        while best.i + best.size < ahi
            && best.j + best.size < bhi
            && self.a[best.i + best.size] == self.b[best.j + best.size]
        {
            best.size += 1;
        }
        best
    }
}
