//! Employee Onboarding Workflow
//!
//! Demo workflow driven through the durable context:
//!
//! ```text
//! createEmployee --+--> provisionLaptop --+--> sendWelcomeEmail
//!                  +--> provisionAccess --+
//! ```
//!
//! The two provisioning steps run side by side and are joined before
//! the welcome email goes out.

use std::thread;
use std::time::Duration;

use chrono::Utc;
use log::info;

use crate::engine::{BoxError, DurableContext, Result, WorkerPool};

pub const CREATE_EMPLOYEE: &str = "createEmployee";
pub const PROVISION_LAPTOP: &str = "provisionLaptop";
pub const PROVISION_ACCESS: &str = "provisionAccess";
pub const SEND_WELCOME_EMAIL: &str = "sendWelcomeEmail";

/// Step names in workflow order.
pub const STEP_NAMES: [&str; 4] = [
    CREATE_EMPLOYEE,
    PROVISION_LAPTOP,
    PROVISION_ACCESS,
    SEND_WELCOME_EMAIL,
];

/// Side effects performed by the onboarding steps.
pub trait OnboardingActions: Sync {
    /// Creates the employee record and returns its id.
    fn create_employee(&self) -> std::result::Result<String, BoxError>;

    fn provision_laptop(&self, employee_id: &str) -> std::result::Result<(), BoxError>;

    fn provision_access(&self, employee_id: &str) -> std::result::Result<(), BoxError>;

    fn send_welcome_email(&self, employee_id: &str) -> std::result::Result<(), BoxError>;
}

/// Stand-in for real provisioning systems: logs and sleeps.
#[derive(Debug, Clone)]
pub struct SimulatedActions {
    pub create_delay: Duration,
    pub laptop_delay: Duration,
    pub access_delay: Duration,
    pub email_delay: Duration,
}

impl Default for SimulatedActions {
    fn default() -> Self {
        Self {
            create_delay: Duration::from_millis(2000),
            laptop_delay: Duration::from_millis(3000),
            access_delay: Duration::from_millis(2500),
            email_delay: Duration::from_millis(1500),
        }
    }
}

impl SimulatedActions {
    /// No delays, for tests.
    pub fn instant() -> Self {
        Self {
            create_delay: Duration::ZERO,
            laptop_delay: Duration::ZERO,
            access_delay: Duration::ZERO,
            email_delay: Duration::ZERO,
        }
    }
}

impl OnboardingActions for SimulatedActions {
    fn create_employee(&self) -> std::result::Result<String, BoxError> {
        info!("[Workflow] Creating employee record");
        thread::sleep(self.create_delay);
        let employee_id = format!("EMP-{}", Utc::now().timestamp_millis());
        info!("[Workflow] Employee record created: {}", employee_id);
        Ok(employee_id)
    }

    fn provision_laptop(&self, employee_id: &str) -> std::result::Result<(), BoxError> {
        info!("[Workflow] Provisioning laptop for {}", employee_id);
        thread::sleep(self.laptop_delay);
        info!("[Workflow] Laptop provisioned");
        Ok(())
    }

    fn provision_access(&self, employee_id: &str) -> std::result::Result<(), BoxError> {
        info!("[Workflow] Provisioning system access for {}", employee_id);
        thread::sleep(self.access_delay);
        info!("[Workflow] System access provisioned");
        Ok(())
    }

    fn send_welcome_email(&self, employee_id: &str) -> std::result::Result<(), BoxError> {
        info!("[Workflow] Sending welcome email to {}", employee_id);
        thread::sleep(self.email_delay);
        info!("[Workflow] Welcome email sent");
        Ok(())
    }
}

/// The onboarding workflow bound to a context.
pub struct OnboardingWorkflow<'a, A: OnboardingActions> {
    ctx: &'a DurableContext,
    actions: &'a A,
    pool: WorkerPool,
}

impl<'a, A: OnboardingActions> OnboardingWorkflow<'a, A> {
    pub fn new(ctx: &'a DurableContext, actions: &'a A) -> Self {
        Self {
            ctx,
            actions,
            pool: WorkerPool::new(2),
        }
    }

    /// Sets the pool the provisioning steps fan out on.
    pub fn set_pool(&mut self, pool: WorkerPool) {
        self.pool = pool;
    }

    /// Runs (or resumes) the workflow; returns the employee id.
    pub fn run(&self) -> Result<String> {
        let ctx = self.ctx;
        let actions = self.actions;

        let employee_id: String = ctx.step(CREATE_EMPLOYEE, || actions.create_employee())?;

        let (laptop, access) = self.pool.join(
            || ctx.step(PROVISION_LAPTOP, || actions.provision_laptop(&employee_id)),
            || ctx.step(PROVISION_ACCESS, || actions.provision_access(&employee_id)),
        );
        laptop?;
        access?;

        ctx.step(SEND_WELCOME_EMAIL, || actions.send_welcome_email(&employee_id))?;

        info!("[Workflow] Employee onboarding workflow completed");
        Ok(employee_id)
    }
}

/// Resolves a crash target given as a step name or its 1-based number.
pub fn resolve_step(choice: &str) -> Option<&'static str> {
    if let Ok(number) = choice.parse::<usize>() {
        return number.checked_sub(1).and_then(|i| STEP_NAMES.get(i)).copied();
    }
    STEP_NAMES.iter().find(|name| **name == choice).copied()
}
