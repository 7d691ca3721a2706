use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

use schedule_cell::models::{
    BreakTime, ScheduleError, ScheduleStatus, UpsertScheduleRequest, WorkingHours,
};
use schedule_cell::services::reservation::ReservationService;
use schedule_cell::services::schedule::{ScheduleService, ScheduleStore};

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

struct Fixture {
    store: Arc<ScheduleStore>,
    schedules: ScheduleService,
    reservations: Arc<ReservationService>,
    doctor_id: Uuid,
    date: NaiveDate,
}

fn fixture() -> Fixture {
    let store = Arc::new(ScheduleStore::new());
    let schedules = ScheduleService::new(Arc::clone(&store));
    let reservations = Arc::new(ReservationService::new(Arc::clone(&store)));
    let doctor_id = Uuid::new_v4();
    let date = d(2026, 9, 14);

    schedules
        .create_or_update(UpsertScheduleRequest {
            doctor_id,
            date,
            working_hours: WorkingHours {
                start: t(9, 0),
                end: t(17, 0),
            },
            slot_duration_minutes: Some(30),
            consultation_fee: Some(150.0),
            break_times: Some(vec![BreakTime {
                start: t(12, 0),
                end: t(13, 0),
                reason: Some("lunch".to_string()),
            }]),
            is_working_day: None,
            status: None,
            is_recurring: None,
            recurring_pattern: None,
            recurring_days: None,
            recurring_end_date: None,
        })
        .unwrap();

    Fixture {
        store,
        schedules,
        reservations,
        doctor_id,
        date,
    }
}

impl Fixture {
    fn occupancy_at(&self, start: NaiveTime) -> (i32, bool) {
        let schedule = self.schedules.get(self.doctor_id, self.date).unwrap();
        let slot = schedule.slot(start).unwrap();
        (slot.current_patients, slot.is_available)
    }

    fn set_capacity(&self, start: NaiveTime, capacity: i32) {
        self.store.update(&(self.doctor_id, self.date), |schedule| {
            let slot = schedule.slot_mut(start).unwrap();
            slot.max_patients = capacity;
            slot.is_available = slot.current_patients < slot.max_patients;
        });
    }
}

#[test]
fn claim_consumes_capacity_and_flips_availability() {
    let fx = fixture();

    let slot_ref = fx.reservations.claim(fx.doctor_id, fx.date, t(10, 0)).unwrap();
    assert_eq!(slot_ref.start_time, t(10, 0));
    assert_eq!(slot_ref.end_time, t(10, 30));
    assert_eq!(slot_ref.consultation_fee, 150.0);
    assert_eq!(slot_ref.max_patients, 1);

    assert_eq!(fx.occupancy_at(t(10, 0)), (1, false));
}

#[test]
fn second_claim_on_full_slot_fails() {
    let fx = fixture();

    fx.reservations.claim(fx.doctor_id, fx.date, t(10, 0)).unwrap();
    assert_matches!(
        fx.reservations.claim(fx.doctor_id, fx.date, t(10, 0)),
        Err(ScheduleError::SlotUnavailable)
    );
    assert_eq!(fx.occupancy_at(t(10, 0)), (1, false));
}

#[test]
fn two_concurrent_claims_yield_one_success_one_unavailable() {
    let fx = fixture();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let reservations = Arc::clone(&fx.reservations);
            let doctor_id = fx.doctor_id;
            let date = fx.date;
            std::thread::spawn(move || reservations.claim(doctor_id, date, t(10, 0)))
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let losses = results
        .iter()
        .filter(|r| matches!(r, Err(ScheduleError::SlotUnavailable)))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(losses, 1);

    let schedule = fx.schedules.get(fx.doctor_id, fx.date).unwrap();
    let slot = schedule.slot(t(10, 0)).unwrap();
    assert_eq!(slot.current_patients, 1);
    assert!(!slot.is_available);
}

#[test]
fn concurrent_claims_admit_exactly_the_capacity() {
    let fx = fixture();
    fx.set_capacity(t(14, 0), 3);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let reservations = Arc::clone(&fx.reservations);
            let doctor_id = fx.doctor_id;
            let date = fx.date;
            std::thread::spawn(move || reservations.claim(doctor_id, date, t(14, 0)))
        })
        .collect();

    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|r| r.is_ok())
        .count();

    assert_eq!(successes, 3);
    assert_eq!(fx.occupancy_at(t(14, 0)), (3, false));
}

#[test]
fn release_is_idempotent_and_floored() {
    let fx = fixture();

    fx.reservations.claim(fx.doctor_id, fx.date, t(9, 0)).unwrap();
    fx.reservations.release(fx.doctor_id, fx.date, t(9, 0)).unwrap();
    assert_eq!(fx.occupancy_at(t(9, 0)), (0, true));

    // Releasing an already-open slot is a no-op, not an error.
    fx.reservations.release(fx.doctor_id, fx.date, t(9, 0)).unwrap();
    assert_eq!(fx.occupancy_at(t(9, 0)), (0, true));
}

#[test]
fn claim_then_release_restores_the_slot() {
    let fx = fixture();
    let before = fx.occupancy_at(t(11, 0));

    fx.reservations.claim(fx.doctor_id, fx.date, t(11, 0)).unwrap();
    fx.reservations.release(fx.doctor_id, fx.date, t(11, 0)).unwrap();

    assert_eq!(fx.occupancy_at(t(11, 0)), before);
}

#[test]
fn break_slots_behave_like_fully_booked_slots() {
    let fx = fixture();

    assert_matches!(
        fx.reservations.claim(fx.doctor_id, fx.date, t(12, 0)),
        Err(ScheduleError::SlotUnavailable)
    );
    assert_matches!(
        fx.reservations.claim(fx.doctor_id, fx.date, t(12, 30)),
        Err(ScheduleError::SlotUnavailable)
    );
}

#[test]
fn missing_schedule_is_not_bookable() {
    let fx = fixture();

    assert_matches!(
        fx.reservations.claim(Uuid::new_v4(), fx.date, t(10, 0)),
        Err(ScheduleError::NotBookable)
    );
}

#[test]
fn inactive_schedule_is_not_bookable() {
    let fx = fixture();
    fx.store.update(&(fx.doctor_id, fx.date), |schedule| {
        schedule.status = ScheduleStatus::Inactive;
    });

    assert_matches!(
        fx.reservations.claim(fx.doctor_id, fx.date, t(10, 0)),
        Err(ScheduleError::NotBookable)
    );
}

#[test]
fn non_working_day_is_not_bookable() {
    let fx = fixture();
    fx.store.update(&(fx.doctor_id, fx.date), |schedule| {
        schedule.is_working_day = false;
    });

    assert_matches!(
        fx.reservations.claim(fx.doctor_id, fx.date, t(10, 0)),
        Err(ScheduleError::NotBookable)
    );
}

#[test]
fn unknown_time_is_slot_not_found() {
    let fx = fixture();

    assert_matches!(
        fx.reservations.claim(fx.doctor_id, fx.date, t(10, 17)),
        Err(ScheduleError::SlotNotFound)
    );
}

#[test]
fn occupancy_stays_in_bounds_under_mixed_load() {
    let fx = fixture();
    fx.set_capacity(t(15, 0), 2);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let reservations = Arc::clone(&fx.reservations);
            let doctor_id = fx.doctor_id;
            let date = fx.date;
            std::thread::spawn(move || {
                for _ in 0..50 {
                    if i % 2 == 0 {
                        let _ = reservations.claim(doctor_id, date, t(15, 0));
                    } else {
                        let _ = reservations.release(doctor_id, date, t(15, 0));
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let schedule = fx.schedules.get(fx.doctor_id, fx.date).unwrap();
    for slot in &schedule.time_slots {
        assert!(slot.current_patients >= 0);
        assert!(slot.current_patients <= slot.max_patients);
        assert_eq!(slot.is_available, slot.current_patients < slot.max_patients);
    }
}
