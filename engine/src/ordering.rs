//! Position bookkeeping for an ordered favorites list.

use crate::{error::Result, Error, FavoriteEntity, Timestamp};

/// Move the item at `old_index` so it lands at `new_index`.
///
/// Both indices must be in `[0, len)`. When moving down the list the target is
/// shifted by one, because removing the item first moves every later item up.
pub fn move_item<T>(list: &mut Vec<T>, old_index: usize, new_index: usize) -> Result<()> {
    let len = list.len();
    for index in [old_index, new_index] {
        if index >= len {
            return Err(Error::InvalidIndex { index, len });
        }
    }

    let item = list.remove(old_index);
    let target = if old_index < new_index {
        new_index - 1
    } else {
        new_index
    };
    list.insert(target, item);
    Ok(())
}

/// Rebuild every entity with `position` equal to its index.
pub fn renumber(list: Vec<FavoriteEntity>, now: Timestamp) -> Vec<FavoriteEntity> {
    list.into_iter()
        .enumerate()
        .map(|(index, favorite)| favorite.at_position(index as u32, now))
        .collect()
}

/// Order by position, breaking ties by station for determinism.
pub fn sort_by_position(list: &mut [FavoriteEntity]) {
    list.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then_with(|| a.station_id.cmp(&b.station_id))
    });
}

/// Sort, then close any gaps or duplicates in the positions.
pub fn normalize(mut list: Vec<FavoriteEntity>, now: Timestamp) -> Vec<FavoriteEntity> {
    sort_by_position(&mut list);
    renumber(list, now)
}

/// True when the positions are exactly `0..len` in list order.
pub fn positions_are_contiguous(list: &[FavoriteEntity]) -> bool {
    list.iter()
        .enumerate()
        .all(|(index, favorite)| favorite.position as usize == index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(ids: &[&str]) -> Vec<FavoriteEntity> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| FavoriteEntity::new("u", *id, id.to_uppercase(), i as u32, 100))
            .collect()
    }

    fn ids(list: &[FavoriteEntity]) -> Vec<&str> {
        list.iter().map(|f| f.station_id.as_str()).collect()
    }

    #[test]
    fn move_up() {
        let mut items = vec!["a", "b", "c", "d"];
        move_item(&mut items, 3, 1).unwrap();
        assert_eq!(items, vec!["a", "d", "b", "c"]);
    }

    #[test]
    fn move_down_adjusts_target() {
        let mut items = vec!["a", "b", "c", "d"];
        move_item(&mut items, 0, 2).unwrap();
        assert_eq!(items, vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn same_index_is_noop() {
        let mut items = vec!["a"];
        move_item(&mut items, 0, 0).unwrap();
        assert_eq!(items, vec!["a"]);
    }

    #[test]
    fn out_of_range_rejected_without_change() {
        let mut items = vec!["a", "b"];
        let err = move_item(&mut items, 5, 0).unwrap_err();
        assert_eq!(err, Error::InvalidIndex { index: 5, len: 2 });

        let err = move_item(&mut items, 0, 2).unwrap_err();
        assert_eq!(err, Error::InvalidIndex { index: 2, len: 2 });
        assert_eq!(items, vec!["a", "b"]);

        let mut empty: Vec<&str> = Vec::new();
        assert!(move_item(&mut empty, 0, 0).is_err());
    }

    #[test]
    fn renumber_after_move() {
        let mut favorites = list(&["a", "b", "c"]);
        move_item(&mut favorites, 2, 0).unwrap();
        let favorites = renumber(favorites, 200);

        assert_eq!(ids(&favorites), vec!["c", "a", "b"]);
        assert!(positions_are_contiguous(&favorites));
        // Only moved entities are touched
        assert!(favorites.iter().all(|f| f.last_updated_millis == 200));

        let unchanged = renumber(list(&["x", "y"]), 300);
        assert!(unchanged.iter().all(|f| f.last_updated_millis == 100));
    }

    #[test]
    fn normalize_closes_gaps_and_duplicates() {
        let mut favorites = list(&["a", "b", "c"]);
        favorites[0].position = 7;
        favorites[1].position = 3;
        favorites[2].position = 3;

        let favorites = normalize(favorites, 500);
        assert_eq!(ids(&favorites), vec!["b", "c", "a"]);
        assert!(positions_are_contiguous(&favorites));
    }
}
