//! Channel selection and quiet-hours policy, pure over a loaded preference
//! document so it can be exercised without a database.

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use tracing::warn;
use worklink_db::models::{Channel, DigestFrequency, NotificationPreference, NotificationType, QuietHours};

/// Resolves the channel set for one (preferences, type) pair.
///
/// A channel is selected iff its channel-level toggle is on and the
/// type-specific override is not explicitly false. SMS additionally requires
/// the type to be security-related unless an override explicitly opts in.
/// Email is suppressed entirely under the `Never` digest setting.
pub fn resolve_channels(
    prefs: &NotificationPreference,
    notification_type: NotificationType,
) -> Vec<Channel> {
    let type_key = notification_type.as_str();
    let mut channels = Vec::new();

    for channel in Channel::ALL {
        if !prefs.channel_enabled(channel) {
            continue;
        }
        let type_override = prefs.type_override(type_key, channel);
        if type_override == Some(false) {
            continue;
        }
        match channel {
            Channel::Sms => {
                // Off for everything non-security unless explicitly opted in.
                if !notification_type.is_security() && type_override != Some(true) {
                    continue;
                }
            }
            Channel::Email => {
                if prefs.email_digest == DigestFrequency::Never {
                    continue;
                }
            }
            _ => {}
        }
        channels.push(channel);
    }

    channels
}

/// Channels suppressed while the user's quiet hours are active. Security
/// types are exempt: a compromised account should wake the phone up.
pub fn apply_quiet_hours(
    channels: Vec<Channel>,
    prefs: &NotificationPreference,
    notification_type: NotificationType,
    now: DateTime<Utc>,
) -> Vec<Channel> {
    if notification_type.is_security() || !quiet_hours_active(&prefs.quiet_hours, now) {
        return channels;
    }
    channels
        .into_iter()
        .filter(|c| !matches!(c, Channel::Push | Channel::Sms))
        .collect()
}

/// Whether `now` falls inside the user's quiet window `[start, end)`,
/// evaluated in the configured timezone. A start later than the end wraps
/// past midnight. Malformed configuration counts as inactive.
pub fn quiet_hours_active(quiet: &QuietHours, now: DateTime<Utc>) -> bool {
    if !quiet.enabled {
        return false;
    }

    let (Some(start), Some(end)) = (parse_hhmm(&quiet.start), parse_hhmm(&quiet.end)) else {
        warn!(start = %quiet.start, end = %quiet.end, "Malformed quiet hours, ignoring");
        return false;
    };

    let tz: Tz = match quiet.timezone.parse() {
        Ok(tz) => tz,
        Err(_) => {
            warn!(timezone = %quiet.timezone, "Unknown quiet-hours timezone, ignoring");
            return false;
        }
    };

    let local = now.with_timezone(&tz).time();
    let local = NaiveTime::from_hms_opt(local.hour(), local.minute(), 0).unwrap_or(local);

    if start <= end {
        local >= start && local < end
    } else {
        // Overnight window, e.g. 22:00-08:00.
        local >= start || local < end
    }
}

fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;
    use chrono::TimeZone;
    use worklink_db::models::TypeChannelOverrides;

    use crate::dao::preference::PreferenceDao;

    fn prefs() -> NotificationPreference {
        PreferenceDao::defaults(ObjectId::new())
    }

    fn quiet(start: &str, end: &str) -> QuietHours {
        QuietHours {
            enabled: true,
            start: start.to_string(),
            end: end.to_string(),
            timezone: "UTC".to_string(),
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, hour, minute, 0).unwrap()
    }

    #[test]
    fn defaults_select_in_app_email_push() {
        let channels = resolve_channels(&prefs(), NotificationType::JobAlert);
        assert_eq!(channels, vec![Channel::InApp, Channel::Email, Channel::Push]);
    }

    #[test]
    fn resolution_is_deterministic() {
        let p = prefs();
        let first = resolve_channels(&p, NotificationType::NewReview);
        for _ in 0..10 {
            assert_eq!(resolve_channels(&p, NotificationType::NewReview), first);
        }
    }

    #[test]
    fn push_disabled_yields_in_app_and_email() {
        let mut p = prefs();
        p.push_enabled = false;
        let channels = resolve_channels(&p, NotificationType::JobAlert);
        assert_eq!(channels, vec![Channel::InApp, Channel::Email]);
    }

    #[test]
    fn sms_requires_security_type() {
        let mut p = prefs();
        p.sms_enabled = true;
        assert!(!resolve_channels(&p, NotificationType::NewMessage).contains(&Channel::Sms));
        assert!(resolve_channels(&p, NotificationType::SecurityAlert).contains(&Channel::Sms));
    }

    #[test]
    fn sms_explicit_opt_in_overrides_security_gate() {
        let mut p = prefs();
        p.sms_enabled = true;
        p.type_preferences.insert(
            NotificationType::JobAlert.as_str().to_string(),
            TypeChannelOverrides {
                sms: Some(true),
                ..Default::default()
            },
        );
        assert!(resolve_channels(&p, NotificationType::JobAlert).contains(&Channel::Sms));
    }

    #[test]
    fn type_override_false_drops_channel() {
        let mut p = prefs();
        p.type_preferences.insert(
            NotificationType::NewReview.as_str().to_string(),
            TypeChannelOverrides {
                email: Some(false),
                ..Default::default()
            },
        );
        let channels = resolve_channels(&p, NotificationType::NewReview);
        assert!(!channels.contains(&Channel::Email));
        assert!(channels.contains(&Channel::InApp));
    }

    #[test]
    fn never_digest_suppresses_email() {
        let mut p = prefs();
        p.email_digest = DigestFrequency::Never;
        assert!(!resolve_channels(&p, NotificationType::JobAlert).contains(&Channel::Email));
    }

    #[test]
    fn all_channels_disabled_yields_empty_set() {
        let mut p = prefs();
        p.in_app_enabled = false;
        p.email_enabled = false;
        p.push_enabled = false;
        assert!(resolve_channels(&p, NotificationType::JobAlert).is_empty());
    }

    #[test]
    fn overnight_quiet_window() {
        let q = quiet("22:00", "08:00");
        assert!(quiet_hours_active(&q, at(23, 0)));
        assert!(quiet_hours_active(&q, at(7, 0)));
        assert!(!quiet_hours_active(&q, at(12, 0)));
    }

    #[test]
    fn same_day_quiet_window() {
        let q = quiet("08:00", "22:00");
        assert!(quiet_hours_active(&q, at(12, 0)));
        assert!(!quiet_hours_active(&q, at(23, 0)));
    }

    #[test]
    fn window_start_inclusive_end_exclusive() {
        let q = quiet("08:00", "22:00");
        assert!(quiet_hours_active(&q, at(8, 0)));
        assert!(!quiet_hours_active(&q, at(22, 0)));
    }

    #[test]
    fn disabled_quiet_hours_never_active() {
        let mut q = quiet("00:00", "23:59");
        q.enabled = false;
        assert!(!quiet_hours_active(&q, at(12, 0)));
    }

    #[test]
    fn unknown_timezone_counts_as_inactive() {
        let mut q = quiet("00:00", "23:59");
        q.timezone = "Mars/Olympus_Mons".to_string();
        assert!(!quiet_hours_active(&q, at(12, 0)));
    }

    #[test]
    fn quiet_hours_respects_timezone() {
        let mut q = quiet("22:00", "08:00");
        q.timezone = "America/New_York".to_string();
        // 03:00 UTC is 22:00 or 23:00 in New York depending on DST; either
        // way it is inside a 22:00-08:00 window.
        assert!(quiet_hours_active(&q, at(3, 0)));
    }

    #[test]
    fn quiet_hours_drop_push_and_sms_for_non_security() {
        let mut p = prefs();
        p.quiet_hours = quiet("00:00", "23:59");
        let channels = vec![Channel::InApp, Channel::Email, Channel::Push, Channel::Sms];
        let filtered =
            apply_quiet_hours(channels.clone(), &p, NotificationType::JobAlert, at(12, 0));
        assert_eq!(filtered, vec![Channel::InApp, Channel::Email]);

        let kept = apply_quiet_hours(channels, &p, NotificationType::SecurityAlert, at(12, 0));
        assert_eq!(kept.len(), 4);
    }
}
