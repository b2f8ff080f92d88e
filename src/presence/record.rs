use crate::error::Result;
use crate::pool::{NativeBuffer, NativeBufferPool};
use crate::presence::raw::{DiscordRichPresence, PresenceFrame, TextField};
use crate::report::Reporter;

/// Cut `input` to at most `limit` bytes without splitting a UTF-8 sequence
pub fn truncate_utf8(input: &str, limit: usize) -> &str {
    if input.len() <= limit {
        return input;
    }
    let mut end = limit;
    while !input.is_char_boundary(end) {
        end -= 1;
    }
    &input[..end]
}

/// Rich presence record with bounded fields
///
/// Setters never fail: over-long text is truncated (with a warning) and
/// negative party sizes become zero. [`build`](Self::build) turns the record
/// into a [`PresenceFrame`] backed by buffers from a [`NativeBufferPool`].
#[derive(Debug, Default)]
pub struct RichPresence {
    texts: [Option<String>; TextField::COUNT],
    start_timestamp: i64,
    end_timestamp: i64,
    party_size: i32,
    party_max: i32,
    instance: bool,
    buffers: Vec<NativeBuffer>,
    reporter: Reporter,
}

impl RichPresence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send truncation warnings and build errors to `reporter`
    pub fn with_reporter(reporter: Reporter) -> Self {
        Self {
            reporter,
            ..Self::default()
        }
    }

    /// Assign a string slot; empty input clears it
    pub fn set_text(&mut self, field: TextField, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        self.texts[field as usize] = if value.is_empty() {
            None
        } else {
            Some(self.bounded(field, value))
        };
        self
    }

    pub fn text(&self, field: TextField) -> Option<&str> {
        self.texts[field as usize].as_deref()
    }

    pub fn set_state(&mut self, state: impl Into<String>) -> &mut Self {
        self.set_text(TextField::State, state)
    }

    pub fn set_details(&mut self, details: impl Into<String>) -> &mut Self {
        self.set_text(TextField::Details, details)
    }

    pub fn set_large_image(&mut self, key: impl Into<String>) -> &mut Self {
        self.set_text(TextField::LargeImageKey, key)
    }

    pub fn set_large_text(&mut self, text: impl Into<String>) -> &mut Self {
        self.set_text(TextField::LargeImageText, text)
    }

    pub fn set_small_image(&mut self, key: impl Into<String>) -> &mut Self {
        self.set_text(TextField::SmallImageKey, key)
    }

    pub fn set_small_text(&mut self, text: impl Into<String>) -> &mut Self {
        self.set_text(TextField::SmallImageText, text)
    }

    pub fn set_party_id(&mut self, id: impl Into<String>) -> &mut Self {
        self.set_text(TextField::PartyId, id)
    }

    pub fn set_match_secret(&mut self, secret: impl Into<String>) -> &mut Self {
        self.set_text(TextField::MatchSecret, secret)
    }

    pub fn set_join_secret(&mut self, secret: impl Into<String>) -> &mut Self {
        self.set_text(TextField::JoinSecret, secret)
    }

    pub fn set_spectate_secret(&mut self, secret: impl Into<String>) -> &mut Self {
        self.set_text(TextField::SpectateSecret, secret)
    }

    /// Unix seconds the elapsed-time display counts from
    pub fn set_start_timestamp(&mut self, timestamp: i64) -> &mut Self {
        self.start_timestamp = timestamp;
        self
    }

    pub fn set_end_timestamp(&mut self, timestamp: i64) -> &mut Self {
        self.end_timestamp = timestamp;
        self
    }

    pub fn set_party_size(&mut self, size: i32) -> &mut Self {
        self.party_size = size.max(0);
        self
    }

    pub fn set_party_max(&mut self, max: i32) -> &mut Self {
        self.party_max = max.max(0);
        self
    }

    pub fn set_instance(&mut self, instance: bool) -> &mut Self {
        self.instance = instance;
        self
    }

    pub fn state(&self) -> Option<&str> {
        self.text(TextField::State)
    }

    pub fn details(&self) -> Option<&str> {
        self.text(TextField::Details)
    }

    pub fn start_timestamp(&self) -> i64 {
        self.start_timestamp
    }

    pub fn end_timestamp(&self) -> i64 {
        self.end_timestamp
    }

    pub fn party_size(&self) -> i32 {
        self.party_size
    }

    pub fn party_max(&self) -> i32 {
        self.party_max
    }

    pub fn instance(&self) -> bool {
        self.instance
    }

    /// Number of non-empty string slots
    pub fn text_field_count(&self) -> usize {
        self.texts.iter().filter(|text| text.is_some()).count()
    }

    /// Native buffers held by the most recent build
    pub fn outstanding_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Build the native record
    ///
    /// Buffers from the previous build go back to `pool` first, then a fresh
    /// buffer is acquired for every non-empty string slot. If any acquisition
    /// fails, everything acquired by this call is released before the error
    /// is returned.
    pub fn build<'a>(&'a mut self, pool: &NativeBufferPool) -> Result<PresenceFrame<'a>> {
        self.release(pool);

        let mut raw = DiscordRichPresence::default();
        let mut failure = None;

        for field in TextField::ALL {
            let Some(text) = self.texts[field as usize].as_deref() else {
                continue;
            };
            match stage(pool, text) {
                Ok(buffer) => {
                    *field.slot_mut(&mut raw) = buffer.as_ptr();
                    self.buffers.push(buffer);
                }
                Err(err) => {
                    failure = Some((field, err));
                    break;
                }
            }
        }

        if let Some((field, err)) = failure {
            self.reporter.error(format!(
                "Error creating presence struct at field '{}': {}",
                field.name(),
                err
            ));
            self.release(pool);
            return Err(err);
        }

        raw.start_timestamp = self.start_timestamp;
        raw.end_timestamp = self.end_timestamp;
        raw.party_size = self.party_size;
        raw.party_max = self.party_max;
        if self.party_max > 0 && self.party_size > self.party_max {
            self.reporter.warn(format!(
                "Party size {} exceeds party max {}, clamping",
                self.party_size, self.party_max
            ));
            raw.party_size = self.party_max;
        }
        raw.instance = i8::from(self.instance);

        Ok(PresenceFrame::new(raw, &self.buffers))
    }

    /// Return every buffer of the last build to `pool`
    pub fn release(&mut self, pool: &NativeBufferPool) {
        for buffer in self.buffers.drain(..) {
            pool.release(buffer);
        }
    }

    fn bounded(&self, field: TextField, value: String) -> String {
        let limit = field.limit();
        if value.len() <= limit {
            return value;
        }
        let kept = truncate_utf8(&value, limit);
        self.reporter.warn(format!(
            "Field '{}' truncated from {} to {} bytes",
            field.name(),
            value.len(),
            kept.len()
        ));
        kept.to_string()
    }
}

fn stage(pool: &NativeBufferPool, text: &str) -> Result<NativeBuffer> {
    let mut buffer = pool.acquire(text.len() + 1)?;
    if let Err(err) = buffer.fill(text) {
        pool.release(buffer);
        return Err(err);
    }
    Ok(buffer)
}
