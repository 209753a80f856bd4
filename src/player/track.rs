use std::{collections::HashMap, sync::Arc};

use serde::Serialize;
use uuid::Uuid;

use crate::{
    common::types::UserId,
    snapshot::{PlaylistRef, TrackRecord},
};

/// Playlist shared by every track loaded from it.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct Playlist {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Track {
    pub id: Uuid,
    pub source_id: String,
    pub title: String,
    pub url: String,
    pub duration_ms: u64,
    pub is_stream: bool,
    pub requester: UserId,
    pub playlist: Option<Arc<Playlist>>,
}

impl Track {
    pub fn new(source_id: impl Into<String>, title: impl Into<String>, duration_ms: u64, requester: UserId) -> Self {
        let source_id = source_id.into();
        Self {
            id: Uuid::new_v4(),
            url: source_id.clone(),
            source_id,
            title: title.into(),
            duration_ms,
            is_stream: false,
            requester,
            playlist: None,
        }
    }

    pub fn from_record(record: TrackRecord, playlists: &mut PlaylistCache) -> Self {
        Self {
            id: record.id,
            source_id: record.source_id,
            title: record.title,
            url: record.url,
            duration_ms: record.duration_ms,
            is_stream: record.is_stream,
            requester: record.requester,
            playlist: record.playlist.map(|p| playlists.resolve(p)),
        }
    }

    pub fn to_record(&self) -> TrackRecord {
        TrackRecord {
            id: self.id,
            source_id: self.source_id.clone(),
            title: self.title.clone(),
            url: self.url.clone(),
            duration_ms: self.duration_ms,
            is_stream: self.is_stream,
            requester: self.requester,
            playlist: self.playlist.as_ref().map(|p| PlaylistRef {
                name: p.name.clone(),
                url: p.url.clone(),
            }),
        }
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Track {}

/// Interns playlists by URL while a snapshot is rebuilt.
#[derive(Default)]
pub struct PlaylistCache {
    by_url: HashMap<String, Arc<Playlist>>,
}

impl PlaylistCache {
    pub fn resolve(&mut self, playlist: PlaylistRef) -> Arc<Playlist> {
        self.by_url
            .entry(playlist.url.clone())
            .or_insert_with(|| {
                Arc::new(Playlist {
                    name: playlist.name,
                    url: playlist.url,
                })
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.by_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_url.is_empty()
    }

    /// Rebuilds a whole list, sharing playlists with everything resolved before.
    pub fn restore<C>(&mut self, records: Vec<TrackRecord>) -> C
    where
        C: FromIterator<Track>,
    {
        records
            .into_iter()
            .map(|record| Track::from_record(record, self))
            .collect()
    }
}
