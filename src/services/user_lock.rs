//! Per-user critical section
//!
//! 같은 사용자에 대한 read-modify-write (기록 추가 → 부채 → 스트릭 → 업적 → 목표)
//! 를 직렬화한다. 다른 사용자끼리는 서로 막지 않는다.
//!
//! 프로세스 내부 직렬화만 담당하며, 프로세스 간 경합은 저장소의 버전 검사가 막는다.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// 이 개수를 넘으면 아무도 잡고 있지 않은 락을 정리
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Default)]
pub struct UserLocks {
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 사용자 락 획득 (guard 가 drop 될 때 해제)
    pub async fn acquire(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let existing = {
            let locks = self.locks.read().await;
            locks.get(user_id).cloned()
        };

        let lock = match existing {
            Some(lock) => lock,
            None => {
                let mut locks = self.locks.write().await;
                if locks.len() >= PRUNE_THRESHOLD {
                    locks.retain(|_, lock| Arc::strong_count(lock) > 1);
                }
                locks
                    .entry(user_id.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone()
            }
        };

        lock.lock_owned().await
    }

    /// 현재 추적 중인 락 개수
    pub async fn tracked(&self) -> usize {
        self.locks.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_user_is_serialized() {
        let locks = Arc::new(UserLocks::new());
        let guard = locks.acquire("u1").await;

        let locks2 = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = locks2.acquire("u1").await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should acquire after release")
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_users_do_not_block() {
        let locks = UserLocks::new();
        let _a = locks.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("b")).await;
        assert!(b.is_ok());
        assert_eq!(locks.tracked().await, 2);
    }

    #[tokio::test]
    async fn test_idle_locks_are_pruned() {
        let locks = UserLocks::new();
        for i in 0..PRUNE_THRESHOLD {
            drop(locks.acquire(&format!("user-{}", i)).await);
        }
        assert_eq!(locks.tracked().await, PRUNE_THRESHOLD);

        let _held = locks.acquire("fresh").await;
        assert_eq!(locks.tracked().await, 1);
    }
}
