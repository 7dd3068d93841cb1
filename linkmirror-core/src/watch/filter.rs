use std::path::PathBuf;

use notify::Event;
use notify::event::{CreateKind, EventKind, ModifyKind, RenameMode};

/// Path a raw notify event asks us to look at, if any.
///
/// Only creations and moves into the tree count. Writes, removals and
/// metadata changes are ignored since producers write then rename.
pub fn candidate_path(event: &Event) -> Option<PathBuf> {
    match event.kind {
        EventKind::Create(CreateKind::File | CreateKind::Any) => event.paths.first().cloned(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any)) => {
            event.paths.first().cloned()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event.paths.get(1).cloned(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{DataChange, RemoveKind};

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |event, path| event.add_path(PathBuf::from(path)))
    }

    #[test]
    fn creations_and_moves_are_candidates() {
        assert_eq!(
            candidate_path(&event(EventKind::Create(CreateKind::File), &["/src/a.mkv"])),
            Some(PathBuf::from("/src/a.mkv"))
        );
        assert_eq!(
            candidate_path(&event(
                EventKind::Modify(ModifyKind::Name(RenameMode::To)),
                &["/src/b.mkv"]
            )),
            Some(PathBuf::from("/src/b.mkv"))
        );
        assert_eq!(
            candidate_path(&event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/src/b.part", "/src/b.mkv"]
            )),
            Some(PathBuf::from("/src/b.mkv"))
        );
    }

    #[test]
    fn other_events_are_ignored() {
        let ignored = [
            EventKind::Create(CreateKind::Folder),
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            EventKind::Remove(RemoveKind::File),
            EventKind::Other,
        ];
        for kind in ignored {
            assert_eq!(candidate_path(&event(kind, &["/src/a.mkv"])), None, "{kind:?}");
        }
        assert_eq!(
            candidate_path(&event(EventKind::Modify(ModifyKind::Name(RenameMode::Both)), &["/src/a"])),
            None
        );
    }
}
