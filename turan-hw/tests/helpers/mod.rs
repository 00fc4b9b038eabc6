//! Test Helper Utilities
//!
//! Shared utilities for testing turan-hw

#![allow(dead_code)]

pub mod db_utils;
pub mod fake_transcriber;

pub use db_utils::{
    add_student, count_rows, create_test_db, mark_attendance, seed_group, seed_lesson,
    seed_payment, seed_user, set_setting, Classroom,
};
pub use fake_transcriber::{ScriptedTranscriber, Step};

use std::sync::Arc;
use turan_common::db::Role;
use turan_hw::services::{Caller, SweepIntervals};
use turan_hw::Assembly;
use uuid::Uuid;

/// Fake WAV payload; the scripted transcriber never decodes it
pub const AUDIO: &[u8] = b"RIFF\x24\x00\x00\x00WAVEfmt ";

/// Lesson text used by `Harness::new`
pub const EXPECTED_TEXT: &str = "The quick brown fox jumps over the lazy dog";

/// Classroom plus fully wired services over a temporary database
///
/// Background tasks are not started; tests drive the worker and scheduler
/// directly so every step is deterministic.
pub struct Harness {
    pub classroom: Classroom,
    pub assembly: Assembly,
    pub transcriber: Arc<ScriptedTranscriber>,
}

impl Harness {
    pub async fn new(script: Vec<Step>) -> Self {
        Self::with_settings(script, &[]).await
    }

    /// Build with settings rows written before the services load them
    pub async fn with_settings(script: Vec<Step>, settings: &[(&str, &str)]) -> Self {
        let classroom = Classroom::new(2, EXPECTED_TEXT).await;

        // Keep failure paths fast
        set_setting(&classroom.pool, "transcription_backoff_ms", "1").await;
        for (key, value) in settings {
            set_setting(&classroom.pool, key, value).await;
        }

        let transcriber = Arc::new(ScriptedTranscriber::new(script));
        let assembly = Assembly::new(
            classroom.pool.clone(),
            classroom.dir.path(),
            transcriber.clone(),
            SweepIntervals::default(),
        )
        .await
        .expect("assemble services");

        Self {
            classroom,
            assembly,
            transcriber,
        }
    }

    pub fn caller(&self, user_id: Uuid) -> Caller {
        let role = if user_id == self.classroom.admin {
            Role::Admin
        } else if user_id == self.classroom.teacher || user_id == self.classroom.other_teacher {
            Role::Teacher
        } else {
            Role::Student
        };
        Caller { user_id, role }
    }

    pub fn student(&self, index: usize) -> Caller {
        self.caller(self.classroom.students[index])
    }

    pub fn teacher(&self) -> Caller {
        self.caller(self.classroom.teacher)
    }

    pub fn admin(&self) -> Caller {
        self.caller(self.classroom.admin)
    }

    /// Assign the classroom lesson and return the first student's record id
    pub async fn assign(&self) -> Uuid {
        let created = self
            .assembly
            .state
            .assigner
            .assign_lesson(self.classroom.lesson)
            .await
            .expect("assign lesson");
        created
            .iter()
            .find(|hw| hw.student_id == self.classroom.students[0])
            .expect("record for first student")
            .id
    }

    /// Assign and submit audio for the first student
    pub async fn submitted(&self) -> Uuid {
        let homework_id = self.assign().await;
        self.assembly
            .state
            .intake
            .submit(&self.student(0), homework_id, "audio/wav", AUDIO)
            .await
            .expect("submit audio");
        homework_id
    }

    pub async fn balance(&self, student_id: Uuid) -> u32 {
        self.assembly
            .state
            .ledger
            .account(student_id)
            .await
            .expect("account")
            .total
    }
}
