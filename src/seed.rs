//! Sample catalogue used to populate an empty board for local development.

use chrono::{Days, NaiveDate, Utc};

use crate::engine::JobEngine;
use crate::error::Result;
use crate::state_machine::{Job, JobKind, NewJob};

struct SampleJob {
    creator_id: &'static str,
    title: &'static str,
    description: &'static str,
    long_description: &'static str,
    bounty: f64,
    kind: JobKind,
    deadline_in_days: u64,
    requirements: &'static [&'static str],
    claimed_by: Option<&'static str>,
}

const CATALOGUE: &[SampleJob] = &[
    SampleJob {
        creator_id: "creator-1",
        title: "Edit my 2-min TikTok gameplay montage",
        description: "Need fast-paced cuts with trending transitions and text overlays.",
        long_description: "15 minutes of gameplay highlights to cut down to a 2-minute montage \
            with smooth transitions, captions for key moments and trending sound effects.",
        bounty: 25.0,
        kind: JobKind::ShortForm,
        deadline_in_days: 6,
        requirements: &["Premiere Pro", "After Effects", "Captions"],
        claimed_by: None,
    },
    SampleJob {
        creator_id: "creator-1",
        title: "YouTube vlog edit - 10 min video",
        description: "Weekly travel vlog needing color correction and smooth cuts.",
        long_description: "About 2 hours of raw travel footage to cut into a 10-minute story.",
        bounty: 80.0,
        kind: JobKind::LongForm,
        deadline_in_days: 9,
        requirements: &["Final Cut Pro", "Color Grading", "Audio Mixing"],
        claimed_by: Some("editor-1"),
    },
    SampleJob {
        creator_id: "creator-2",
        title: "Instagram Reel - Product showcase",
        description: "30-second reel for skincare product with trending audio.",
        long_description: "Product shots and lifestyle b-roll for a polished 30-second reel.",
        bounty: 35.0,
        kind: JobKind::ShortForm,
        deadline_in_days: 3,
        requirements: &["Premiere Pro", "Motion Graphics", "Color Grading"],
        claimed_by: None,
    },
    SampleJob {
        creator_id: "creator-3",
        title: "YouTube Short from stream highlight",
        description: "Turn a funny gaming moment into a viral Short.",
        long_description: "A 5-minute Twitch clip with a 45-second moment worth a Short: \
            cut it down, add captions and zoom on reactions.",
        bounty: 20.0,
        kind: JobKind::ShortForm,
        deadline_in_days: 4,
        requirements: &["Any editing software", "Subtitles", "Sound design"],
        claimed_by: None,
    },
];

/// Post every sample job through `engine`, claiming the ones the catalogue
/// marks as taken. Returns the jobs in their final state.
pub fn seed_catalogue(engine: &JobEngine) -> Result<Vec<Job>> {
    let today = Utc::now().date_naive();
    let mut jobs = Vec::with_capacity(CATALOGUE.len());

    for (i, sample) in CATALOGUE.iter().enumerate() {
        let job = engine.create_job(
            sample.creator_id,
            NewJob {
                title: sample.title.to_string(),
                description: sample.description.to_string(),
                long_description: Some(sample.long_description.to_string()),
                bounty: sample.bounty,
                video_url: format!("https://example.com/raw-footage-{}.mp4", i + 1),
                kind: Some(sample.kind),
                deadline: deadline(today, sample.deadline_in_days),
                requirements: sample.requirements.iter().map(|r| r.to_string()).collect(),
            },
        )?;
        let job = match sample.claimed_by {
            Some(editor_id) => engine.claim_job(&job.id, editor_id)?,
            None => job,
        };
        jobs.push(job);
    }

    Ok(jobs)
}

fn deadline(today: NaiveDate, days: u64) -> Option<NaiveDate> {
    today.checked_add_days(Days::new(days))
}
