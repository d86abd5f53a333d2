/*
* Licensed under the Apache License, Version 2.0 (the "License");
* you may not use this file except in compliance with the License.
* You may obtain a copy of the License at
*
*  http://www.apache.org/licenses/LICENSE-2.0
*
* Unless required by applicable law or agreed to in writing,
* software distributed under the License is distributed on an
* "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
* KIND, either express or implied.  See the License for the
* specific language governing permissions and limitations
* under the License.
*/

/// Deterministically splits `n` elements into `min(n, 100 * workers)`
/// contiguous, balanced chunks: sizes differ by at most one element.
pub fn chunk_ranges(n: usize, workers: usize) -> Vec<(usize, usize)> {
    let chunk_count = n.min(100 * workers).max(1);
    let base = n / chunk_count;
    let remainder = n % chunk_count;

    let mut ranges = Vec::with_capacity(chunk_count);
    let mut start = 0;
    for i in 0..chunk_count {
        let len = base + if i < remainder { 1 } else { 0 };
        if len == 0 {
            continue;
        }
        ranges.push((start, len));
        start += len;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_cover_every_element_exactly_once() {
        let ranges = chunk_ranges(1000, 4);
        let total: usize = ranges.iter().map(|(_, len)| len).sum();
        assert_eq!(total, 1000);
        assert_eq!(ranges.len(), 400);
        assert_eq!(ranges[0].0, 0);
    }

    #[test]
    fn chunk_count_is_capped_at_n() {
        let ranges = chunk_ranges(3, 4);
        assert_eq!(ranges.len(), 3);
        for (_, len) in &ranges {
            assert_eq!(*len, 1);
        }
    }

    #[test]
    fn sizes_differ_by_at_most_one() {
        let ranges = chunk_ranges(103, 4);
        let lens: Vec<usize> = ranges.iter().map(|(_, l)| *l).collect();
        let min = *lens.iter().min().unwrap();
        let max = *lens.iter().max().unwrap();
        assert!(max - min <= 1);
    }
}
