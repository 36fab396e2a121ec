//! Body metrics packed into the wristband settings.

use crate::domain::settings::UserProfile;
use crate::error::CalculationError;
use crate::infrastructure::bluetooth::protocol::{SettingsCommand, SETTINGS_LEN};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

/// Kids bands count shorter strides, so their goal is scaled up.
const KIDS_GOAL_FACTOR: f64 = 1.167;

pub fn goal_steps(is_kids: bool, steps_target: u32) -> u32 {
    if is_kids {
        (f64::from(steps_target) * KIDS_GOAL_FACTOR).round() as u32
    } else {
        steps_target
    }
}

/// Calories per step in the wristband's fixed-point unit.
pub fn calories_per_step(weight_kg: f64) -> i32 {
    (weight_kg * 693.0 - 4500.0).round() as i32
}

/// Mifflin-St Jeor BMR, in hundredths.
///
/// Only "m" selects the male formula; every other code uses the female one.
pub fn bmr(age: i32, weight_kg: f64, height_cm: f64, gender: &str) -> i32 {
    let offset = if gender == "m" { 5.0 } else { -161.0 };
    let kcal = 10.0 * weight_kg + 6.25 * height_cm - 5.0 * f64::from(age) + offset;
    kcal.round() as i32 * 100
}

pub fn steps_to_meters(distance_per_step: u32, steps: u32) -> u32 {
    (f64::from(distance_per_step) * f64::from(steps) / 10_000.0).round() as u32
}

/// Calories burned so far today: walking plus the BMR share of the elapsed day.
pub fn steps_to_calories(
    steps: u32,
    age: i32,
    weight_kg: f64,
    height_cm: f64,
    gender: &str,
    hour: u32,
    minute: u32,
) -> f64 {
    let calorie = f64::from(calories_per_step(weight_kg));
    let bmr = f64::from(bmr(age, weight_kg, height_cm, gender));
    let elapsed_minutes = f64::from(hour * 60 + minute);

    let bmr_calorie = (bmr * elapsed_minutes) / 18.0 * 125.0;
    (calorie * f64::from(steps) + bmr_calorie) / 1_000_000.0
}

/// Age in whole years on `today` for a "yyyy-mm-dd" birth date.
pub fn age(date_of_birth: &str, today: NaiveDate) -> Result<i32, CalculationError> {
    let birthday = NaiveDate::parse_from_str(date_of_birth, "%Y-%m-%d")
        .map_err(|_| CalculationError::InvalidDateOfBirth(date_of_birth.to_string()))?;
    if birthday > today {
        return Err(CalculationError::DateOfBirthInFuture(
            date_of_birth.to_string(),
        ));
    }

    let mut age = today.year() - birthday.year();
    if (today.month(), today.day()) < (birthday.month(), birthday.day()) {
        age -= 1;
    }
    Ok(age)
}

/// Build the settings command for `user` with the clock set to `now`.
pub fn settings_command(
    is_kids: bool,
    user: &UserProfile,
    now: NaiveDateTime,
) -> Result<SettingsCommand, CalculationError> {
    let age = age(&user.date_of_birth, now.date())?;

    Ok(SettingsCommand {
        hour24: true,
        hour: now.hour() as u8,
        minute: now.minute() as u8,
        second: now.second() as u8,
        goal_steps: goal_steps(is_kids, user.steps_target),
        goal_unit: false,
        distance_per_step: user.distance_per_step,
        distance_unit: true,
        calories_per_step: calories_per_step(user.weight),
        bmr: bmr(age, user.weight, user.height, &user.gender),
        over_100_goal: true,
    })
}

/// Encoded clock and user settings, ready for `set_clock_and_user_settings`.
pub fn create_wristband_settings(
    is_kids: bool,
    user: &UserProfile,
    now: NaiveDateTime,
) -> Result<[u8; SETTINGS_LEN], CalculationError> {
    Ok(settings_command(is_kids, user, now)?.encode())
}
