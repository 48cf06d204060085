//! Volunteer-to-incident matching.
//!
//! Scoring is additive and integer-valued:
//!
//! | Term | Points |
//! |------|--------|
//! | each required skill the volunteer has | +20 |
//! | medical required and volunteer trained | +30 |
//! | distance `d` below `max_distance_km` | `floor(50 * (1 - d / max))` |
//! | at least one past response | +10 |
//!
//! Only volunteers scoring above zero are returned. The engine keeps the
//! order of the candidate pool; [`rank_by_score`] sorts when a caller needs
//! a strict ranking.

use std::cmp::Reverse;

use crisis_db::{DbError, Store};
use crisis_types::{Incident, IncidentId, MatchCandidate, MatchRequest, Volunteer};

/// Kilometres per degree used by [`planar_distance_km`].
pub const KM_PER_DEGREE: f64 = 111.0;

/// Points per matching required skill.
pub const SKILL_POINTS: u32 = 20;

/// Points for medical training when medical help is required.
pub const MEDICAL_POINTS: u32 = 30;

/// Maximum points from proximity.
pub const DISTANCE_POINTS: f64 = 50.0;

/// Points for having responded before.
pub const VETERAN_POINTS: u32 = 10;

/// Errors from [`match_volunteers`].
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    /// The incident in the request does not exist.
    #[error("incident {0} not found")]
    IncidentNotFound(IncidentId),

    /// The store could not be read.
    #[error("store error: {0}")]
    Store(#[from] DbError),
}

/// Approximate distance between two coordinates: the squared coordinate
/// delta in degrees scaled by [`KM_PER_DEGREE`].
///
/// This is not a great-circle distance. It is kept for compatibility with
/// scores produced by earlier deployments, so each product is rounded on
/// its own rather than fused.
#[allow(clippy::suboptimal_flops)]
pub fn planar_distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = lat1 - lat2;
    let dlon = lon1 - lon2;
    (dlat * dlat + dlon * dlon) * KM_PER_DEGREE
}

/// Proximity points for a volunteer `distance_km` away.
fn distance_points(distance_km: f64, max_distance_km: f64) -> Option<u32> {
    if max_distance_km > 0.0 && distance_km < max_distance_km {
        let raw = (DISTANCE_POINTS * (1.0 - distance_km / max_distance_km)).floor();
        // raw is within [0, 50] here.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let points = raw.clamp(0.0, DISTANCE_POINTS) as u32;
        Some(points)
    } else {
        None
    }
}

/// Score one volunteer. Returns `None` when the score is zero.
///
/// Availability and medical filtering happen in [`match_candidates`]; this
/// function only adds up the terms.
pub fn score_volunteer(
    request: &MatchRequest,
    incident: &Incident,
    volunteer: &Volunteer,
) -> Option<MatchCandidate> {
    let mut score: u32 = 0;
    let mut reasons = Vec::new();

    let skill_matches = request
        .required_skills
        .iter()
        .filter(|skill| volunteer.skills.contains(skill))
        .count();
    if skill_matches > 0 {
        let matches = u32::try_from(skill_matches).unwrap_or(u32::MAX);
        score = score.saturating_add(matches.saturating_mul(SKILL_POINTS));
        reasons.push(format!("Matches {skill_matches} required skills"));
    }

    if request.medical_required && volunteer.medical_training {
        score = score.saturating_add(MEDICAL_POINTS);
        reasons.push("Has medical training".to_owned());
    }

    let distance_km = planar_distance_km(
        incident.latitude,
        incident.longitude,
        volunteer.latitude,
        volunteer.longitude,
    );
    if let Some(points) = distance_points(distance_km, request.max_distance_km) {
        score = score.saturating_add(points);
        reasons.push(format!("Within {distance_km:.1} km"));
    }

    if volunteer.responses_count > 0 {
        score = score.saturating_add(VETERAN_POINTS);
        reasons.push(format!(
            "Veteran volunteer ({} responses)",
            volunteer.responses_count
        ));
    }

    (score > 0).then(|| MatchCandidate {
        volunteer: volunteer.clone(),
        score,
        distance_km,
        reasons,
    })
}

/// Filter `pool` to eligible volunteers and score them, keeping pool order.
pub fn match_candidates(
    request: &MatchRequest,
    incident: &Incident,
    pool: &[Volunteer],
) -> Vec<MatchCandidate> {
    pool.iter()
        .filter(|v| v.available && (!request.medical_required || v.medical_training))
        .filter_map(|v| score_volunteer(request, incident, v))
        .collect()
}

/// Sort candidates by score, highest first. Ties keep their relative order.
pub fn rank_by_score(candidates: &mut [MatchCandidate]) {
    candidates.sort_by_key(|candidate| Reverse(candidate.score));
}

/// Load the incident and the available pool from `store`, then match.
///
/// # Errors
///
/// Returns [`MatchError::IncidentNotFound`] if the incident does not exist,
/// or [`MatchError::Store`] if the store cannot be read.
pub async fn match_volunteers(
    store: &Store,
    request: &MatchRequest,
) -> Result<Vec<MatchCandidate>, MatchError> {
    let incident = store
        .get_incident(request.incident_id)
        .await?
        .ok_or(MatchError::IncidentNotFound(request.incident_id))?;
    let pool = store.available_volunteers(request.medical_required).await?;
    let matches = match_candidates(request, &incident, &pool);
    tracing::debug!(
        incident_id = %request.incident_id,
        pool = pool.len(),
        matches = matches.len(),
        "Matched volunteers"
    );
    Ok(matches)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Utc;
    use crisis_db::MemoryStore;
    use crisis_types::{IncidentStatus, IncidentType, Severity, VolunteerId};

    use super::*;

    fn incident_at(lat: f64, lon: f64) -> Incident {
        let now = Utc::now();
        Incident {
            id: IncidentId::new(),
            title: "Flood".to_owned(),
            description: String::new(),
            incident_type: IncidentType::NaturalDisaster,
            status: IncidentStatus::Reported,
            severity: Severity::High,
            latitude: lat,
            longitude: lon,
            location_name: String::new(),
            address: String::new(),
            country: String::new(),
            region: String::new(),
            reporter_name: String::new(),
            reporter_contact: String::new(),
            affected_people: 0,
            casualties: 0,
            image_urls: Vec::new(),
            video_urls: Vec::new(),
            verified: false,
            verified_at: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn volunteer(name: &str, skills: &[&str], lat: f64, lon: f64) -> Volunteer {
        let now = Utc::now();
        Volunteer {
            id: VolunteerId::new(),
            full_name: name.to_owned(),
            email: format!("{name}@example.org"),
            phone: String::new(),
            age: 30,
            gender: String::new(),
            skills: skills.iter().map(|s| (*s).to_owned()).collect(),
            certifications: Vec::new(),
            languages: Vec::new(),
            medical_training: false,
            latitude: lat,
            longitude: lon,
            location_name: String::new(),
            address: String::new(),
            country: String::new(),
            available: true,
            availability_note: String::new(),
            currently_deployed: false,
            deployed_to: None,
            deployed_at: None,
            background_checked: false,
            responses_count: 0,
            hours_volunteered: 0.0,
            last_active_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn request(incident: &Incident, skills: &[&str], max_km: f64) -> MatchRequest {
        MatchRequest {
            incident_id: incident.id,
            required_skills: skills.iter().map(|s| (*s).to_owned()).collect::<BTreeSet<_>>(),
            medical_required: false,
            max_distance_km: max_km,
        }
    }

    #[test]
    fn distance_uses_squared_delta_times_111() {
        let d = planar_distance_km(0.0, 0.0, 1.0, 1.0);
        assert!((d - 222.0).abs() < 1e-9);
        assert!(planar_distance_km(5.0, 5.0, 5.0, 5.0).abs() < 1e-12);
    }

    #[test]
    fn distance_rounds_each_square_separately() {
        // A fused multiply-add would round this to exactly 11.1.
        let d = planar_distance_km(0.1, 0.3, 0.0, 0.0);
        assert_eq!(d.to_bits(), 11.100_000_000_000_001_f64.to_bits());
    }

    #[test]
    fn one_shared_skill_counts_once() {
        let incident = incident_at(0.0, 0.0);
        let req = request(&incident, &["medical", "logistics"], 0.0);
        let v = volunteer("ana", &["medical"], 0.0, 0.0);

        let candidate = score_volunteer(&req, &incident, &v).unwrap();
        assert_eq!(candidate.score, 20);
        assert_eq!(candidate.reasons, vec!["Matches 1 required skills".to_owned()]);
    }

    #[test]
    fn duplicate_volunteer_skills_do_not_double_count() {
        let incident = incident_at(0.0, 0.0);
        let req = request(&incident, &["medical"], 0.0);
        let v = volunteer("ben", &["medical", "medical"], 0.0, 0.0);
        assert_eq!(score_volunteer(&req, &incident, &v).unwrap().score, 20);
    }

    #[test]
    fn distance_term_floors_proximity_share() {
        let incident = incident_at(0.0, 0.0);
        // 0.1 degrees each way: (0.01 + 0.01) * 111 = 2.22 km.
        let v = volunteer("cai", &[], 0.1, 0.1);
        let req = request(&incident, &[], 10.0);
        let candidate = score_volunteer(&req, &incident, &v).unwrap();
        // floor(50 * (1 - 0.222)) = floor(38.9) = 38
        assert_eq!(candidate.score, 38);
        assert_eq!(candidate.reasons, vec!["Within 2.2 km".to_owned()]);
    }

    #[test]
    fn volunteer_beyond_radius_can_still_match_on_other_terms() {
        let incident = incident_at(0.0, 0.0);
        let mut v = volunteer("dee", &["logistics"], 10.0, 10.0);
        v.responses_count = 3;
        let req = request(&incident, &["logistics"], 5.0);

        let candidate = score_volunteer(&req, &incident, &v).unwrap();
        assert_eq!(candidate.score, 30);
        assert!(candidate.reasons.iter().all(|r| !r.starts_with("Within")));
        assert!(
            candidate
                .reasons
                .contains(&"Veteran volunteer (3 responses)".to_owned())
        );
    }

    #[test]
    fn zero_score_is_excluded() {
        let incident = incident_at(0.0, 0.0);
        let v = volunteer("eve", &["cooking"], 40.0, 40.0);
        let req = request(&incident, &["medical"], 1.0);
        assert!(score_volunteer(&req, &incident, &v).is_none());
        assert!(match_candidates(&req, &incident, &[v]).is_empty());
    }

    #[test]
    fn medical_requirement_filters_and_scores() {
        let incident = incident_at(0.0, 0.0);
        let mut medic = volunteer("fay", &[], 50.0, 50.0);
        medic.medical_training = true;
        let layman = volunteer("gus", &["medical"], 0.0, 0.0);
        let mut req = request(&incident, &["medical"], 0.0);
        req.medical_required = true;

        let matches = match_candidates(&req, &incident, &[layman, medic]);
        assert_eq!(matches.len(), 1);
        let only = matches.first().unwrap();
        assert_eq!(only.volunteer.full_name, "fay");
        assert_eq!(only.score, 30);
        assert_eq!(only.reasons, vec!["Has medical training".to_owned()]);
    }

    #[test]
    fn unavailable_volunteers_are_skipped() {
        let incident = incident_at(0.0, 0.0);
        let mut busy = volunteer("hal", &["medical"], 0.0, 0.0);
        busy.available = false;
        let req = request(&incident, &["medical"], 0.0);
        assert!(match_candidates(&req, &incident, &[busy]).is_empty());
    }

    #[test]
    fn engine_keeps_pool_order_and_ranking_sorts() {
        let incident = incident_at(0.0, 0.0);
        let low = volunteer("ivy", &["a"], 0.0, 0.0);
        let high = volunteer("jon", &["a", "b"], 0.0, 0.0);
        let req = request(&incident, &["a", "b"], 0.0);

        let mut matches = match_candidates(&req, &incident, &[low, high]);
        let names: Vec<_> = matches.iter().map(|m| m.volunteer.full_name.clone()).collect();
        assert_eq!(names, vec!["ivy", "jon"]);

        rank_by_score(&mut matches);
        let names: Vec<_> = matches.iter().map(|m| m.volunteer.full_name.clone()).collect();
        assert_eq!(names, vec!["jon", "ivy"]);
    }

    #[tokio::test]
    async fn missing_incident_is_not_found() {
        let store = Store::from(MemoryStore::new());
        let req = MatchRequest {
            incident_id: IncidentId::new(),
            required_skills: BTreeSet::new(),
            medical_required: false,
            max_distance_km: 10.0,
        };
        let err = match_volunteers(&store, &req).await.unwrap_err();
        assert!(matches!(err, MatchError::IncidentNotFound(id) if id == req.incident_id));
    }

    #[tokio::test]
    async fn empty_pool_returns_empty_list() {
        let store = Store::from(MemoryStore::new());
        let incident = incident_at(1.0, 1.0);
        store.insert_incident(&incident).await.unwrap();
        let req = request(&incident, &["medical"], 10.0);
        let matches = match_volunteers(&store, &req).await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn store_backed_match_scores_registered_volunteers() {
        let store = Store::from(MemoryStore::new());
        let incident = incident_at(0.0, 0.0);
        store.insert_incident(&incident).await.unwrap();
        store
            .insert_volunteer(&volunteer("kim", &["logistics"], 0.0, 0.0))
            .await
            .unwrap();

        let req = request(&incident, &["logistics"], 0.0);
        let matches = match_volunteers(&store, &req).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches.first().unwrap().score, 20);
    }
}
