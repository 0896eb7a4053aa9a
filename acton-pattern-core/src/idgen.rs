/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Short random identifiers for messages, transactions and delegates.

use rand::Rng;

/// Default length of message and transaction ids.
pub const MESSAGE_ID_LEN: usize = 12;

/// Default length of delegate discriminators.
pub const DELEGATE_ID_LEN: usize = 4;

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Returns a random lowercase alphanumeric string of `len` characters.
#[must_use]
pub fn idgen(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| char::from(ALPHABET[rng.random_range(0..ALPHABET.len())]))
        .collect()
}

/// Returns a message id of the default length.
#[must_use]
pub fn message_id() -> String {
    idgen(MESSAGE_ID_LEN)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn ids_have_requested_length_and_alphabet() {
        for len in [0, 1, DELEGATE_ID_LEN, MESSAGE_ID_LEN, 40] {
            let id = idgen(len);
            assert_eq!(id.len(), len);
            assert!(id.bytes().all(|b| ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn message_ids_do_not_collide_in_practice() {
        let ids: HashSet<_> = (0..10_000).map(|_| message_id()).collect();
        assert_eq!(ids.len(), 10_000);
    }
}
